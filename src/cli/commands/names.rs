//! Names Command
//!
//! Usage:
//!   petpal names --pet-type cat [--style S] [--count N] [-f json]

use crate::cli::CommandContext;
use crate::flows::NameRequest;
use crate::types::Result;

pub fn run(ctx: &CommandContext, request: &NameRequest) -> Result<()> {
    let result = super::runtime()?.block_on(ctx.petpal.generate_names(request))?;

    ctx.report(&result, |out, list| {
        out.header(&format!("Name ideas for your {}", request.pet_type));
        out.bullets(&list.names);
    })
}
