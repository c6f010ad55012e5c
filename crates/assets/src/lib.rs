//! Local availability of the stem files: which ones a song needs, where they
//! live, and how missing ones are fetched.

mod fetch;
mod provision;
mod stems;

pub use fetch::{FetchError, HttpFetcher, StemFetcher};
pub use provision::{
    AssetProvisioner, FailureKind, FailureReason, ProvisioningPolicy, ProvisioningState,
};
pub use stems::{Stem, StemGroup, StemSet, StemSetError};
