//! Infrastructure layer: configuration, logging, HTML parsing, page fetching
//! with retries, and the external reasoning gateway.

pub mod config;
pub mod json_sink;
pub mod logging;
pub mod page_fetcher;
pub mod parsing;
pub mod parsing_error;
pub mod reasoning_gateway;
pub mod retry_policy;

// Re-export commonly used items
pub use config::{ConfigManager, ScoutConfig, defaults, marketplace};
pub use json_sink::JsonLinesSink;
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use page_fetcher::{FetchError, FetchedPage, HttpPageDriver, PageDriver, PageFetcher};
pub use parsing::{
    ExtractionReport, ParsingError, ParsingResult, ProductDetailParser, ProductListParser,
};
pub use reasoning_gateway::{
    GatewayReply, OpenAiChatBackend, ReasoningBackend, ReasoningError, ReasoningGateway,
    ReasoningRequest, ReasoningResponse,
};
pub use retry_policy::{FailureClass, RetryPolicy};
