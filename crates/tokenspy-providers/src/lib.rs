//! # tokenspy-providers
//!
//! Vendor wire-protocol support for usage tracking.
//!
//! - **Provider SPI**: [`Provider`] trait for pricing, request analysis,
//!   request rewriting, and usage extraction from responses and streams
//! - **Implementations**: [`AnthropicProvider`] and
//!   [`OpenAiCompatibleProvider`] (`openai`, `moonshot`, `local`)
//! - **Registry**: [`ProviderRegistry`] with cached default instances
//! - **Streams**: SSE framing and [`StreamUsageAccumulator`]
//! - **Exchanges**: [`ExchangeRecorder`] turns one request/response into a
//!   [`UsageRecord`](tokenspy_core::UsageRecord)

#![deny(unsafe_code)]

pub mod accumulator;
mod analysis;
pub mod anthropic;
pub mod client;
pub mod exchange;
mod fields;
pub mod openai;
pub mod pricing;
pub mod provider;
pub mod registry;
pub mod sse;

pub use accumulator::StreamUsageAccumulator;
pub use anthropic::AnthropicProvider;
pub use exchange::ExchangeRecorder;
pub use openai::{OpenAiCompatibleProvider, OpenAiFlavor};
pub use pricing::{ANTHROPIC_PRICING, ModelPricing, OPENAI_PRICING, PricingTable, detect_vendor};
pub use provider::{Provider, ProviderConfig, ProviderError, ProviderResult};
pub use registry::{ProviderFactory, ProviderRegistry, global_registry};
pub use sse::{SseFrame, parse_sse_frames};
