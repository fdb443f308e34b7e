pub(crate) mod azure_openai;
pub mod category;
pub mod engine;
pub mod keywords;

pub use azure_openai::AzureOpenAiClient;
pub use category::{invalid_categories, Category, ClassificationResult};
pub use engine::{ClassificationEngine, Classifier};
pub use keywords::FALLBACK_KEYWORDS;
