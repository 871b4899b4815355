#[cfg(feature = "tokio")]
mod async_parity;
mod cursor;
mod fallback;
mod include;
mod metadata;
mod operators;
mod parameters;
mod select;
