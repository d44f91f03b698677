pub mod block_ctx;
pub mod block_flow;

pub use block_ctx::BlockCtx;
pub use block_flow::BlockExecutor;
