// Token values - the data flowing between transitions

//! # Token Models
//!
//! A token is the value a fired transition deposits into its output place.
//! The engine never looks inside a token: jobs produce and consume them as
//! opaque, shareable values.
//!
//! - `TokenValue`: cheap-to-clone, type-erased payload (`Arc<dyn Any>`)
//! - `Token`: a payload plus where it came from and when it was deposited
//!
//! ## Rust Learning Notes:
//!
//! ### Type Erasure with `Any`
//! `std::any::Any` lets us store values of any `'static` type behind one
//! pointer type and recover the concrete type later with `downcast_ref`.
//! Wrapping it in `Arc` makes the value shareable between the many tasks
//! that read the same place.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::place::TransitionId;

/// Opaque payload held by a place
#[derive(Clone)]
pub struct TokenValue {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl TokenValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        TokenValue {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The payload used for source places nobody seeded
    pub fn unit() -> Self {
        TokenValue::new(())
    }

    /// Borrow the payload as `T`, `None` when the token holds another type
    ///
    /// ```rust
    /// # use track_pipeline::TokenValue;
    /// let token = TokenValue::new(42u32);
    /// assert_eq!(token.downcast_ref::<u32>(), Some(&42));
    /// assert!(token.downcast_ref::<String>().is_none());
    /// ```
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Share the payload as `Arc<T>` without cloning the value itself
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for TokenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenValue<{}>", self.type_name)
    }
}

/// A token deposited into a place during one run
#[derive(Debug, Clone)]
pub struct Token {
    /// The payload produced by the transition (or the seed for sources)
    pub value: TokenValue,

    /// Which transition produced it, `None` for seeded source tokens
    pub produced_by: Option<TransitionId>,

    /// When the token was deposited (UTC)
    pub created_at: DateTime<Utc>,
}

impl Token {
    pub fn produced(value: TokenValue, transition: TransitionId) -> Self {
        Token {
            value,
            produced_by: Some(transition),
            created_at: Utc::now(),
        }
    }

    pub fn seeded(value: TokenValue) -> Self {
        Token {
            value,
            produced_by: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_seed(&self) -> bool {
        self.produced_by.is_none()
    }
}
