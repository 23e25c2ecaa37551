pub mod recipient_service;
pub mod session_service;

pub use recipient_service::{CareRecipient, RecipientChanges, RecipientError, RecipientStore};
pub use session_service::{SessionError, SessionService, SessionTokens};
