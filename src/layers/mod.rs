pub(crate) mod band;
pub(crate) mod cache;
pub(crate) mod decompose;
pub(crate) mod extend;
