pub mod canvas_session;
pub mod canvas_store;
pub mod connection_graph;
pub mod geometry;
pub mod layout_merge;
pub mod layout_persistence;
pub mod layout_store;
pub mod save_debouncer;
