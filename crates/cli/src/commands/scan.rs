use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use photolala_core::{Library, ProcessProgress};

fn active_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {bar:30.cyan/blue} {spinner:.green} {pos:>5}/{len:<5} {prefix:.dim}",
    )
    .unwrap()
    .progress_chars("━╸─")
}

fn done_style() -> ProgressStyle {
    ProgressStyle::with_template("  {bar:30.green} {prefix:.green} {msg:.dim}").unwrap()
}

pub fn run(library: &Library) -> Result<()> {
    let mut pb: Option<ProgressBar> = None;

    let report = library.scan(
        Some(&mut |progress| match progress {
            ProcessProgress::Started { total } => {
                let bar = ProgressBar::new(total as u64);
                bar.set_style(active_style());
                bar.set_prefix("Cataloging");
                bar.enable_steady_tick(std::time::Duration::from_millis(80));
                pb = Some(bar);
            }
            ProcessProgress::BatchComplete { processed, .. } => {
                if let Some(ref bar) = pb {
                    bar.set_position(processed as u64);
                }
            }
            ProcessProgress::Complete { cataloged, failed } => {
                if let Some(bar) = pb.take() {
                    bar.set_style(done_style());
                    bar.set_prefix("done");
                    bar.finish_with_message(format!(
                        "{cataloged} cataloged, {failed} failed"
                    ));
                }
            }
        }),
        None,
    )?;

    println!();
    if report.cancelled {
        println!("  Scan cancelled.");
    } else {
        println!("  Scan complete: {} photos cataloged.", report.cataloged);
    }

    if !report.failures.is_empty() {
        println!();
        println!("  Failures:");
        for failure in &report.failures {
            println!("    {}: {}", failure.name, failure.reason);
        }
    }
    println!();

    Ok(())
}
