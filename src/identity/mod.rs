//! Identity domain: countries, sessions, extracted identities, customers.

pub mod model;
pub mod normalize;

pub use model::{
    CompositeKey, Country, CustomerRecord, CustomerStatus, ExtractedIdentity, ExtractionMethod,
    IdentityRecord, PROFILE_SORT_KEY, SessionId, last4, masked_id,
};
pub use normalize::{
    derive_email, find_national_id, is_valid_national_id, normalize_national_id, normalize_text,
};
