//! Ask Command
//!
//! Usage:
//!   petpal ask "<query>" [-f json]

use crate::cli::CommandContext;
use crate::flows::QueryRequest;
use crate::types::Result;

const DISCLAIMER: &str =
    "This is general information. Consult a veterinarian for advice about your pet.";

pub fn run(ctx: &CommandContext, query: &str) -> Result<()> {
    let request = QueryRequest {
        query: query.to_string(),
    };
    let result = super::runtime()?.block_on(ctx.petpal.ask(&request))?;

    ctx.report(&result, |out, answer| {
        println!();
        out.paragraph(&answer.answer);
        if answer.disclaimer_needed {
            println!();
            out.info(DISCLAIMER);
        }
    })
}
