//! Request validation contracts
//!
//! A [`Validator`] inspects a request and reports every rule it breaks. The
//! dispatch pipeline runs all validators registered for a request type
//! concurrently and short-circuits when any of them fails (see
//! [`ValidationBehavior`](crate::dispatch::behaviors::ValidationBehavior)).
//!
//! Requests that already derive [`validator::Validate`] can be wired in with
//! [`DeriveValidator`] instead of a hand-written validator.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::ValidationErrors;

/// One broken rule on one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub field: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn required(field: impl Into<String>) -> Self {
        Self::new(field, "required")
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Checks a request of type `R`. An empty result means the request is valid.
#[async_trait]
pub trait Validator<R>: Send + Sync + 'static
where
    R: Send + Sync,
{
    async fn validate(&self, request: &R) -> Vec<ValidationFailure>;
}

/// Group failures by field, keeping each field's messages in report order
pub fn group_failures<I>(failures: I) -> ValidationErrors
where
    I: IntoIterator<Item = ValidationFailure>,
{
    let mut errors = ValidationErrors::new();
    for failure in failures {
        errors.add(failure.field, failure.message);
    }
    errors
}

/// Runs a request's `validator::Validate` derive as a [`Validator`].
///
/// Each field error becomes one failure; its message is the rule's custom
/// message when set, otherwise the rule code (`length`, `range`, ...).
///
/// ```rust
/// use courier_core::validation::{DeriveValidator, Validator};
/// use validator::Validate;
///
/// #[derive(Validate)]
/// struct CreateUser {
///     #[validate(length(min = 1, message = "required"))]
///     name: String,
/// }
///
/// # async fn example() {
/// let failures = DeriveValidator::new()
///     .validate(&CreateUser { name: String::new() })
///     .await;
/// assert_eq!(failures[0].field, "name");
/// assert_eq!(failures[0].message, "required");
/// # }
/// ```
pub struct DeriveValidator<R> {
    _request: PhantomData<fn() -> R>,
}

impl<R> DeriveValidator<R> {
    pub fn new() -> Self {
        Self {
            _request: PhantomData,
        }
    }
}

impl<R> Default for DeriveValidator<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for DeriveValidator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeriveValidator")
    }
}

#[async_trait]
impl<R> Validator<R> for DeriveValidator<R>
where
    R: validator::Validate + Send + Sync + 'static,
{
    async fn validate(&self, request: &R) -> Vec<ValidationFailure> {
        let Err(errors) = request.validate() else {
            return Vec::new();
        };

        let mut failures: Vec<ValidationFailure> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, field_errors)| {
                let field = field.to_string();
                field_errors.iter().map(move |error| {
                    let message = error
                        .message
                        .as_ref()
                        .map(|message| message.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    ValidationFailure::new(field.clone(), message)
                })
            })
            .collect();
        failures.sort_by(|a, b| a.field.cmp(&b.field));
        failures
    }
}
