pub(crate) mod answer_parser;
pub(crate) mod answer_text;
pub(crate) mod document_text;
pub(crate) mod exam_session;
pub(crate) mod paper_sync;
pub(crate) mod ranking;
pub(crate) mod scoring;
pub(crate) mod sessions;
pub(crate) mod stores;
