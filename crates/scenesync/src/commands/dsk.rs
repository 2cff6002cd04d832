//! Downstream-keyer tab listing.

use tabled::Tabled;

use crate::cli::{DskArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::Remote;

#[derive(Tabled)]
struct DskRow {
    #[tabled(rename = "Tab")]
    tab: u32,
    #[tabled(rename = "Scene")]
    scene: String,
}

pub async fn handle(remote: &Remote, args: &DskArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let tab_count = remote.engine.session().dsk.tab_count;
    if args.tab > tab_count {
        return Err(CliError::Validation {
            field: "tab".into(),
            reason: format!("the remote reports {tab_count} downstream-keyer tab(s)"),
        });
    }

    let scenes = remote
        .engine
        .dsk_items(args.tab - 1)
        .await
        .map_err(|e| remote.error(e))?;

    let out = output::render_list(
        &global.output,
        &scenes,
        |scene| DskRow {
            tab: args.tab,
            scene: scene.clone(),
        },
        Clone::clone,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
