//! Configuration access port.
//!
//! Values come back as raw strings; parsing and range checks live in
//! [`crate::domain::config`] so every source is validated the same way.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Keys present in a section, empty when the section is absent.
    fn keys(&self, section: &str) -> Vec<String>;
}
