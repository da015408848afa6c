use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;

use super::simulation::RunReport;

#[allow(clippy::cast_precision_loss)]
fn pass_rate(results: &[RunReport]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let passed = results.iter().filter(|r| r.passed()).count();
    (passed as f64 / results.len() as f64) * 100.0
}

pub fn generate_console_report(
    out: &mut dyn Write,
    results: &[RunReport],
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Autopilot Results Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "============================".cyan())?;

    let passed = results.iter().filter(|r| r.passed()).count();
    writeln!(out, "Total runs: {}", results.len())?;
    writeln!(out, "Passed: {}", passed.to_string().green())?;
    writeln!(out, "Failed: {}", (results.len() - passed).to_string().red())?;
    writeln!(out, "Success rate: {:.1}%", pass_rate(results))?;
    writeln!(out, "Total time: {total_duration:?}")?;
    writeln!(out)?;

    for result in results {
        let status = if result.passed() {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };
        writeln!(
            out,
            "{status} {} (seed {})",
            result.strategy.bold(),
            result.seed
        )?;
        writeln!(
            out,
            "   Turns: {}  Ticks: {}  Chapter: {}  Level: {}",
            result.turns_played, result.ticks, result.chapter, result.level
        )?;
        writeln!(
            out,
            "   Credits: {}  Trades: {}  Combats: {}W/{}L  Quests: {}",
            result.credits,
            result.trades,
            result.combats_won,
            result.combats_lost,
            result.quests_completed
        )?;
        writeln!(
            out,
            "   Visited: {}  Encounters: {}  Events: {}  Refused: {}  Draws: {}  Time: {:?}",
            result.systems_visited,
            result.encounters,
            result.events,
            result.rejected_actions,
            result.rng_draws,
            result.duration
        )?;
        if result.stranded {
            writeln!(out, "   {}", "Stranded: no reachable destination".yellow())?;
        }
        if !result.violations.is_empty() {
            writeln!(out, "   Violations:")?;
            for violation in &result.violations {
                writeln!(out, "     • {}", violation.red())?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn generate_json_report(out: &mut dyn Write, results: &[RunReport]) -> Result<()> {
    let json_output = serde_json::to_string_pretty(results)?;
    writeln!(out, "{json_output}")?;
    Ok(())
}

pub fn generate_markdown_report(out: &mut dyn Write, results: &[RunReport]) -> Result<()> {
    writeln!(out, "# Nexus Chronicles Autopilot Results\n")?;

    let passed = results.iter().filter(|r| r.passed()).count();
    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Total runs**: {}", results.len())?;
    writeln!(out, "- **Passed**: {passed}")?;
    writeln!(out, "- **Failed**: {}", results.len() - passed)?;
    writeln!(out, "- **Success rate**: {:.1}%\n", pass_rate(results))?;

    writeln!(out, "## Runs\n")?;
    writeln!(
        out,
        "| Strategy | Seed | Ticks | Chapter | Level | Credits | Trades | Won | Lost | Status |"
    )?;
    writeln!(out, "|---|---|---|---|---|---|---|---|---|---|")?;
    for result in results {
        let status = if result.passed() { "✅" } else { "❌" };
        writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {status} |",
            result.strategy,
            result.seed,
            result.ticks,
            result.chapter,
            result.level,
            result.credits,
            result.trades,
            result.combats_won,
            result.combats_lost
        )?;
    }

    let failing: Vec<&RunReport> = results.iter().filter(|r| !r.passed()).collect();
    if !failing.is_empty() {
        writeln!(out, "\n## Violations\n")?;
        for result in failing {
            writeln!(out, "### {} (seed {})\n", result.strategy, result.seed)?;
            for violation in &result.violations {
                writeln!(out, "- {violation}")?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}
