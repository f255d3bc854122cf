pub(crate) mod answer_sheets;
pub(crate) mod papers;
pub(crate) mod questions;
pub(crate) mod sessions;
