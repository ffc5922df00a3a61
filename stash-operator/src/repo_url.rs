//! Thin re-export of the repo-URL mapping shared with the sidecar (§4.B, §6).
pub(crate) use stash_operator_api::repo_creds::repo_url;
