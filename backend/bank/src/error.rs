use thiserror::Error;

/// Every problem found while checking a form, in the order it was found.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .0.join(", "))]
pub struct ValidationError(pub Vec<String>);

impl ValidationError {
    pub fn single(message: impl Into<String>) -> Self {
        Self(vec![message.into()])
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }
}

/// Collects messages and turns them into a result once checking is done.
#[derive(Default)]
pub(crate) struct Problems(Vec<String>);

impl Problems {
    pub(crate) fn push(&mut self, message: &str) {
        self.0.push(message.to_string());
    }

    pub(crate) fn check(&mut self, ok: bool, message: &str) {
        if !ok {
            self.push(message);
        }
    }

    pub(crate) fn finish<T>(self, value: T) -> Result<T, ValidationError> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError(self.0))
        }
    }
}
