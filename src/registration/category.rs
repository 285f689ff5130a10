use time::Date;

use crate::store::Category;

/// Whole years between `dob` and `today`, counting a year only once its anniversary is reached.
pub fn age_on(dob: Date, today: Date) -> i32 {
    let mut age = today.year() - dob.year();
    let birthday_pending =
        (u8::from(today.month()), today.day()) < (u8::from(dob.month()), dob.day());
    if birthday_pending {
        age -= 1;
    }
    age
}

pub fn category_for_age(age: i32) -> Option<Category> {
    match age {
        8..=12 => Some(Category::Junior),
        13..=19 => Some(Category::Senior),
        _ => None,
    }
}
