//! Score one tracklist entry against one catalog entry and show how the
//! distance breaks down. Useful when tuning thresholds.
//!
//! Usage: score-pair "<artist>" "<title>" "<candidate artist>" "<candidate title>"

use anyhow::Result;
use clap::Parser;

use tracklist_sync::config::{DEFAULT_HIGH_THRESHOLD, DEFAULT_LOW_THRESHOLD};
use tracklist_sync::models::{Candidate, RawTrack};
use tracklist_sync::normalize::{core_title, has_variant_marker, normalize_title, numbering, split_artists};
use tracklist_sync::resolver::{Decision, Thresholds};
use tracklist_sync::scoring::{artist_similarity, title_similarity, LexicalScorer};

#[derive(Parser)]
#[command(name = "score-pair")]
#[command(about = "Show the match distance between a tracklist entry and a catalog entry")]
struct Args {
    artist: String,
    title: String,
    candidate_artist: String,
    candidate_title: String,

    #[arg(long, default_value_t = DEFAULT_LOW_THRESHOLD)]
    low_threshold: f64,

    #[arg(long, default_value_t = DEFAULT_HIGH_THRESHOLD)]
    high_threshold: f64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let thresholds = Thresholds::new(args.low_threshold, args.high_threshold)?;

    let raw = RawTrack::new(args.artist.as_str(), args.title.as_str(), "cli");
    let candidate = Candidate {
        artist: args.candidate_artist.clone(),
        title: args.candidate_title.clone(),
        catalog_id: String::new(),
        raw_rank: 0,
    };

    let raw_credits = split_artists(&raw.artist);
    let candidate_credits = split_artists(&candidate.artist);

    let raw_core = core_title(&raw.title);
    let candidate_core = core_title(&candidate.title);

    println!("Tracklist artist: {:?}", raw_credits);
    println!("Catalog artist:   {:?}", candidate_credits);
    println!(
        "Titles:           {:?} / {:?} (core {:?} / {:?})",
        normalize_title(&raw.title),
        normalize_title(&candidate.title),
        raw_core,
        candidate_core
    );
    println!(
        "Numbering:        {:?} / {:?}",
        numbering(&raw_core),
        numbering(&candidate_core)
    );
    println!(
        "Variant:          {} / {}",
        !raw_credits.remixers.is_empty() || has_variant_marker(&raw.title),
        has_variant_marker(&candidate.title)
    );
    println!("Artist similarity: {:.3}", artist_similarity(&raw_credits, &candidate_credits));
    println!("Title similarity:  {:.3}", title_similarity(&raw.title, &candidate.title));

    let distance = LexicalScorer.distance(&raw, &candidate);
    let verdict = match thresholds.decide(distance) {
        Decision::AutoAccept => "auto-accept",
        Decision::Confirm => "ask",
        Decision::AutoReject => "auto-reject",
    };
    println!("Distance: {:.2} -> {}", distance, verdict);
    Ok(())
}
