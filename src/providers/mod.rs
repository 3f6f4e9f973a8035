pub mod cohere;
pub mod factory;
pub mod gemini;
pub mod openai;
pub mod traits;

pub use cohere::CohereProvider;
pub use factory::build_chain;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use traits::{ChatProvider, ProviderReply};
