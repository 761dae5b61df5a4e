pub mod mentorship;
pub mod user;

pub use mentorship::*;
pub use user::*;
