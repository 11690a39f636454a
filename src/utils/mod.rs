pub mod url;
pub mod validation;
