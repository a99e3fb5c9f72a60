pub mod blob;
pub mod identity;

pub use blob::{BlobClient, BlobError};
pub use identity::{IdentityClient, IdentityError, UserProfile};
