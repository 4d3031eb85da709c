pub(crate) mod config;
pub(crate) mod events;
pub(crate) mod project;
pub(crate) mod render_loop;
pub(crate) mod sink;
