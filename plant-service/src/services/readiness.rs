use service_core::error::AppError;

/// A dependency loaded once at startup. When loading failed the service
/// still starts, and every request needing it gets a "not ready" error.
#[derive(Debug, Clone)]
pub enum Readiness<T> {
    Ready(T),
    NotReady(String),
}

impl<T> Readiness<T> {
    pub fn from_result<E: std::fmt::Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Readiness::Ready(value),
            Err(e) => Readiness::NotReady(e.to_string()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready(_))
    }

    pub fn get(&self) -> Result<&T, AppError> {
        match self {
            Readiness::Ready(value) => Ok(value),
            Readiness::NotReady(reason) => Err(AppError::NotReady(reason.clone())),
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Readiness::Ready(_) => None,
            Readiness::NotReady(reason) => Some(reason),
        }
    }
}
