//! LLM 与嵌入客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod traits;

pub use embedding::{EmbeddingProvider, OpenAiEmbedder};
pub use mock::{MockEmbedder, MockLlmClient};
pub use openai::OpenAiClient;
pub use traits::{extract_json_block, LlmClient};
