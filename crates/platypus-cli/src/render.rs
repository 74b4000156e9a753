//! Terminal output.

use colored::Colorize;
use platypus_analyzer::{Candidate, DisambiguationPlan};
use platypus_formula::{render_sparql, SparqlOptions};
use platypus_qa::{Outcome, QaResponse};

pub fn print_response(question: &str, response: &QaResponse) {
    println!("{} {}", "Q:".bold(), question);
    match &response.outcome {
        Outcome::Answers { answers, partial } => {
            for answer in answers {
                println!(
                    "  {} {} {}",
                    "→".green().bold(),
                    answer.display().bold(),
                    format!("({} · {:.2})", answer.value, answer.confidence).dimmed()
                );
            }
            if *partial {
                println!("  {}", "answers may be incomplete (timed out)".yellow());
            }
        }
        Outcome::NoAnswer { reason } => {
            println!("  {} {:?}", "no answer:".yellow().bold(), reason);
        }
        Outcome::Error { kind } => {
            eprintln!("  {} {}", "error:".red().bold(), kind);
        }
    }
    if let Some(language) = &response.language {
        println!("  {}", format!("language {language} · request {}", response.request_id).dimmed());
    }
}

pub fn print_candidates(question: &str, candidates: &[Candidate], sparql: &SparqlOptions) {
    println!("{} {}", "Q:".bold(), question);
    if candidates.is_empty() {
        println!("  {}", "not understood".yellow());
        return;
    }
    for (rank, candidate) in candidates.iter().enumerate() {
        println!(
            "{:>3}. {} {}",
            rank + 1,
            candidate.query.to_string().bold(),
            format!("{:.3} {}", candidate.confidence, candidate.rule()).dimmed()
        );
        for choice in &candidate.provenance.choices {
            println!(
                "       {:?} {} → {} ({})",
                choice.kind,
                format!("{:?}", choice.surface).cyan(),
                choice.chosen,
                choice.label
            );
        }
        match render_sparql(&candidate.query, sparql) {
            Ok(text) => {
                for line in text.lines() {
                    println!("       {}", line.dimmed());
                }
            }
            Err(error) => println!("       {} {}", "no SPARQL:".yellow(), error),
        }
    }
}

pub fn print_plan(plan: &DisambiguationPlan) {
    if !plan.is_ambiguous() {
        return;
    }
    println!("{}", "Disambiguation:".bold());
    print_step(plan, 1);
}

fn print_step(plan: &DisambiguationPlan, depth: usize) {
    let pad = "  ".repeat(depth);
    match plan {
        DisambiguationPlan::Candidates(candidates) => {
            for candidate in candidates {
                println!("{pad}{}", candidate.query);
            }
        }
        DisambiguationPlan::Step(step) => {
            println!("{pad}which {} did you mean?", format!("{:?}", step.surface).cyan());
            for option in &step.options {
                println!("{pad}- {} ({})", option.label.bold(), option.chosen);
                print_step(&option.then, depth + 1);
            }
            if let DisambiguationPlan::Candidates(others) = step.others.as_ref() {
                if others.is_empty() {
                    return;
                }
            }
            println!("{pad}- {}", "otherwise".italic());
            print_step(&step.others, depth + 1);
        }
    }
}
