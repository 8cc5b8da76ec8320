//! Name Generator
//!
//! Suggests pet names. An empty list from the model is replaced with a single
//! retry hint so callers always have something to show.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::instrument;

use super::{FlowPipeline, FlowResult, FlowSpec, RetryPolicy, to_input};
use crate::ai::client::ModelClient;
use crate::ai::prompt::PromptTemplate;
use crate::ai::schema::{Field, FieldKind, ObjectSchema};
use crate::constants::{fallback, names};
use crate::types::{FallbackReason, PetType, Result};

pub const FLOW_NAME: &str = "nameGenerator";

const SYSTEM: &str = "You are a creative assistant that suggests names for pets.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameRequest {
    pub pet_type: PetType,
    /// Free-text style preference, e.g. "funny" or "classic"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Defaults to 10 when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameList {
    pub names: Vec<String>,
}

pub fn fallback() -> NameList {
    NameList {
        names: vec![fallback::NAMES_RETRY.to_string()],
    }
}

pub fn input_schema() -> ObjectSchema {
    ObjectSchema::new()
        .field(Field::required(
            "petType",
            FieldKind::enumeration(PetType::ALL),
        ))
        .field(
            Field::optional("style", FieldKind::string())
                .describe("Preferred style of names (e.g. funny, classic, unique)"),
        )
        .field(
            Field::optional(
                "count",
                FieldKind::integer()
                    .min(names::MIN_COUNT as f64)
                    .max(names::MAX_COUNT as f64),
            )
            .default_value(json!(names::DEFAULT_COUNT))
            .describe("Number of names to generate"),
        )
}

pub fn output_schema() -> ObjectSchema {
    ObjectSchema::new().field(
        Field::required("names", FieldKind::array_of(FieldKind::string()))
            .describe("Generated pet names"),
    )
}

pub fn template() -> PromptTemplate {
    PromptTemplate::builder()
        .line("Generate a list of unique and creative names for a pet.")
        .newline()
        .text("Pet Type: ")
        .field("petType")
        .newline()
        .when_present("style", |b| b.text("Style Preference: ").field("style").newline())
        .text("Number of Names to Generate: ")
        .field("count")
        .newline()
        .newline()
        .text("Please provide exactly ")
        .field("count")
        .text(" names.")
        .build()
}

pub fn spec() -> Result<FlowSpec> {
    Ok(FlowSpec::new(FLOW_NAME, input_schema(), output_schema(), template())?.with_system(SYSTEM))
}

#[derive(Debug, Clone)]
pub struct NameGenerator {
    pipeline: FlowPipeline,
}

impl NameGenerator {
    pub fn new(client: ModelClient) -> Result<Self> {
        Ok(Self {
            pipeline: FlowPipeline::new(spec()?, client),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.pipeline = self.pipeline.with_retry(retry);
        self
    }

    pub fn spec(&self) -> &FlowSpec {
        self.pipeline.spec()
    }

    #[instrument(skip_all, fields(flow = FLOW_NAME, pet_type = %request.pet_type))]
    pub async fn generate(&self, request: &NameRequest) -> Result<FlowResult<NameList>> {
        self.generate_value(&to_input(request)?).await
    }

    pub async fn generate_value(&self, input: &Value) -> Result<FlowResult<NameList>> {
        let invocation_id = self.pipeline.begin();
        let validated = self.pipeline.validate_input(input)?;

        match self.pipeline.invoke_validated::<NameList>(&validated).await? {
            Ok(list) if list.names.is_empty() => Ok(self.pipeline.degrade(
                invocation_id,
                fallback(),
                FallbackReason::EmptyResult,
            )),
            outcome => Ok(self.pipeline.settle(invocation_id, outcome, |_| fallback())),
        }
    }
}
