//! Thin re-export of the `Repository` resolution shared with the sidecar
//! (§4.B, §6): both the operator's Session/Restore Controllers and the
//! sidecar's backup/restore execution need the same repo URL and password.
pub(crate) use stash_operator_api::repo_creds::{backend, load};
