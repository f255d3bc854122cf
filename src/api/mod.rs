pub(crate) mod errors;
pub(crate) mod handlers;
pub(crate) mod papers;
pub(crate) mod ranking;
pub(crate) mod router;
pub(crate) mod sessions;
