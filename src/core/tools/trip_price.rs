//! Trip price tool (`bewerte_reise_preis`).
//!
//! Quotes a random price for a trip: `round(random[0,1) * 10 * dauer)`.

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::info;

use super::{ToolError, ToolResolver, ToolResult};
use crate::core::realtime::{FunctionDefinition, ToolDefinition};

/// Name the model uses to call the tool.
pub const TRIP_PRICE_TOOL_NAME: &str = "bewerte_reise_preis";

/// Arguments of a trip price call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TripPriceArguments {
    /// Departure
    pub start: String,
    /// Destination
    pub ziel: String,
    /// Means of transport
    pub verkehrsmittel: String,
    /// Duration in minutes
    pub dauer: u32,
}

/// Random trip price resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct TripPriceTool;

impl TripPriceTool {
    /// Price for a trip of `dauer` minutes, in `[0, 10 * dauer]`.
    pub fn price<R: Rng>(dauer: u32, rng: &mut R) -> u64 {
        let factor: f64 = rng.r#gen();
        (factor * 10.0 * f64::from(dauer)).round() as u64
    }
}

#[async_trait]
impl ToolResolver for TripPriceTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: TRIP_PRICE_TOOL_NAME.to_string(),
                description: Some(
                    "Falls der Anrufer nach dem Preis der Reise fragt, nutze diese Funktion um den Preis zu berechnen."
                        .to_string(),
                ),
                parameters: Some(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "start": {
                            "type": "string",
                            "description": "Ort von dem die Reise startet"
                        },
                        "ziel": {
                            "type": "string",
                            "description": "Ort an dem die Reise endet"
                        },
                        "verkehrsmittel": {
                            "type": "string",
                            "description": "Verkehrsmittel für die Reise"
                        },
                        "dauer": {
                            "type": "integer",
                            "description": "Dauer der Reise in Minuten"
                        }
                    },
                    "additionalProperties": false,
                    "required": ["start", "ziel", "verkehrsmittel", "dauer"]
                })),
            },
        }
    }

    async fn resolve(&self, arguments: &str) -> ToolResult<serde_json::Value> {
        let args: TripPriceArguments = serde_json::from_str(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let preis = Self::price(args.dauer, &mut rand::thread_rng());

        info!(
            start = %args.start,
            ziel = %args.ziel,
            verkehrsmittel = %args.verkehrsmittel,
            dauer = args.dauer,
            preis,
            "Quoted random trip price"
        );

        Ok(serde_json::json!({ "preis": preis }))
    }
}
