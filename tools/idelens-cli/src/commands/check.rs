//! Check system capabilities.

use idelens_platform_core::{format_capability_report, Capability};

pub fn run() -> anyhow::Result<()> {
    let mut capabilities: Vec<Capability> = idelens_platform_windows::check_capabilities();
    if cfg!(target_os = "linux") {
        capabilities.extend(idelens_platform_linux::check_capabilities());
    }
    print!("{}", format_capability_report(&capabilities));

    let all_required_ok = capabilities
        .iter()
        .filter(|c| c.required)
        .all(|c| c.available);

    println!();
    if all_required_ok {
        println!("All required capabilities are available. IdeLens is ready.");
    } else {
        println!("Some required capabilities are missing. Use --simulate or see above for fixes.");
    }
    Ok(())
}
