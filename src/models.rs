pub mod attendance;
pub mod audit;
pub mod countdown;
pub mod health;
pub mod session;

use std::borrow::Cow;
use validator::ValidationError;

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message(Cow::from("Value must not be blank")));
    }
    Ok(())
}
