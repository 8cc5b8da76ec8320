//! Symptoms Command
//!
//! Usage:
//!   petpal symptoms --pet-type dog --symptoms "..." [--breed X] [--age N] [-f json]

use crate::cli::CommandContext;
use crate::flows::SymptomRequest;
use crate::types::Result;

pub fn run(ctx: &CommandContext, request: &SymptomRequest) -> Result<()> {
    let result = super::runtime()?.block_on(ctx.petpal.check_symptoms(request))?;

    ctx.report(&result, |out, report| {
        out.section("Potential Causes");
        out.paragraph(&report.potential_causes);
        out.section("Recommendations");
        out.paragraph(&report.recommendations);
        if let Some(warning) = &report.warning {
            println!();
            out.warning(warning);
        }
    })
}
