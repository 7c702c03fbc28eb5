//! Plain-text rendering and stdin prompts.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};

use quiz_core::analysis::{AgeEstimate, FaceReading};
use quiz_core::{Measure, StepView};
use services::{EarnedAchievement, QuizReport, ResultSnapshot};

/// Asks for a 1-based answer until one fits the step, returning the 0-based
/// choice index.
pub fn ask(view: &StepView, input: &mut impl BufRead) -> Result<usize> {
    println!();
    match &view.category {
        Some(category) => println!("[{}/{}] {category}", view.position, view.total),
        None => println!("[{}/{}]", view.position, view.total),
    }
    println!("{}", view.prompt);
    for (i, choice) in view.choices.iter().enumerate() {
        match &choice.detail {
            Some(detail) => println!("  {}. {} ({detail})", i + 1, choice.label),
            None => println!("  {}. {}", i + 1, choice.label),
        }
    }

    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush().context("failed to flush stdout")?;
        line.clear();
        if input.read_line(&mut line).context("failed to read answer")? == 0 {
            bail!("input closed before the quiz finished");
        }
        match parse_answer(&line, view.choices.len()) {
            Some(index) => return Ok(index),
            None => println!("Pick a number from 1 to {}.", view.choices.len()),
        }
    }
}

fn parse_answer(raw: &str, available: usize) -> Option<usize> {
    let n: usize = raw.trim().parse().ok()?;
    (1..=available).contains(&n).then(|| n - 1)
}

/// Parses `WIDTHxHEIGHT`, e.g. `240x300`.
pub fn parse_face(raw: &str) -> Result<FaceReading> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .with_context(|| format!("expected WIDTHxHEIGHT, got `{raw}`"))?;
    let width: f64 = w.trim().parse().with_context(|| format!("bad face width `{w}`"))?;
    let height: f64 = h.trim().parse().with_context(|| format!("bad face height `{h}`"))?;
    Ok(FaceReading::new(width, height)?)
}

pub fn print_age(estimate: &AgeEstimate) {
    println!();
    if estimate.detected {
        println!("Estimated age: {}", estimate.years);
    } else {
        println!("No face found, so here is our best guess: {}", estimate.years);
    }
}

pub fn print_report(report: &QuizReport) {
    print_result(&report.result);
    for badge in &report.new_achievements {
        print_badge(badge);
    }
    println!("Times played: {}", report.completions);
}

fn print_result(result: &ResultSnapshot) {
    println!();
    println!("== {} ==", result.title);
    match &result.outcome {
        Some(outcome) => {
            println!("{} {}", outcome.emoji, outcome.title);
            println!("{}", outcome.summary);
        }
        None => println!("Result: {}", result.classification.tag()),
    }
    match result.classification.measure() {
        Measure::Band { value, .. } => println!("Score: {value:.1}"),
        Measure::Plurality { count, total } => println!("Matched {count} of {total} answers"),
    }

    let tally = result.classification.tally();
    if tally.distinct() > 1 {
        let parts: Vec<String> = tally
            .entries()
            .iter()
            .map(|entry| format!("{} x{}", entry.tag, entry.count))
            .collect();
        println!("Breakdown: {}", parts.join(", "));
    }

    match &result.premium {
        Some(premium) => {
            println!();
            if let Some(score) = premium.compatibility {
                println!("Compatibility score: {score}%");
            }
            for line in &premium.lines {
                println!("  * {line}");
            }
        }
        None => println!(
            "Unlock the full analysis for {} with `quiz unlock {}`.",
            result.price, result.quiz_id
        ),
    }
}

pub fn print_badge(badge: &EarnedAchievement) {
    println!("{} Achievement unlocked: {}", badge.emoji, badge.title);
}
