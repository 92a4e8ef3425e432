pub mod drop_handlers;
