pub(crate) mod clock;
pub(crate) mod glyphs;
pub(crate) mod text;
