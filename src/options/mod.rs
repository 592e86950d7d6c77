//! Request options: from URL text to a validated [`ProcessingOptions`].
//!
//! ```text
//! path + query ──► url::decode_url ──────────────► source URL
//!        │
//!        └──────► query::parse_query ─► handlers ─► ProcessingOptions
//!                        │                  │
//!                   presets::PresetTable    values (token parsers)
//! ```
//!
//! | Module | Role |
//! |---|---|
//! | [`types`] | Enums and sub-records: resize type, gravity, padding, watermark |
//! | [`processing_options`] | The per-request record and its config-derived defaults |
//! | [`values`] | Token parsers: ints, floats, bools, colours, gravity |
//! | [`handlers`] | Option name → arity + parse function table |
//! | [`presets`] | Named option bundles and the swappable registry |
//! | [`url`] | Plain and base64 source locators |
//! | [`query`] | The interpreter tying the above together |

pub mod handlers;
pub mod presets;
pub mod processing_options;
pub mod query;
pub mod types;
pub mod url;
pub mod values;

pub use presets::{PresetRegistry, PresetTable};
pub use processing_options::ProcessingOptions;
pub use query::{UrlOption, apply_url_options, parse_query};
pub use types::{
    Anchor, CropOptions, ExtendOptions, FlipOptions, GravitySpec, PaddingOptions, ResizeType,
    WatermarkOptions,
};
