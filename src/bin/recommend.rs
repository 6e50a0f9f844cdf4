/**
 * RecoReco
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

extern crate env_logger;
extern crate getopts;
extern crate log;
extern crate num_cpus;
extern crate recoreco_als;

use std::env;
use std::error::Error;
use std::fmt::Display;
use std::process;
use std::str::FromStr;
use std::time::Instant;

use getopts::{Matches, Options as Opts};
use log::{error, info};

use recoreco_als::io;
use recoreco_als::io::ArtistNames;
use recoreco_als::utils;
use recoreco_als::{InteractionMatrix, Options, ScoredItem};

fn main() {

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Opts::new();
    opts.optopt("i", "inputfile", "Input file name (required). The input consists of play \
        counts between users and artists, a tab-separated file with the header \
        'userID artistID weight'.", "PATH");
    opts.optopt("a", "artists", "Artists file name (optional), a tab-separated file with the \
        header 'id name ...' used to resolve artist names.", "PATH");
    opts.optopt("o", "outputfile", "Output file name (optional, output will be written to stdout \
        by default).", "PATH");
    opts.optopt("u", "user", "Only compute recommendations for the user with this id (optional, \
        recommends for all users by default).", "ID");
    opts.optopt("n", "num-recommendations", "Number of recommendations per user (optional, \
        defaults to 10).", "NUMBER");
    opts.optopt("c", "config", "JSON file with training options (optional).", "PATH");
    opts.optopt("f", "factors", "Number of latent factors (overrides the config).", "NUMBER");
    opts.optopt("t", "iterations", "Number of ALS iterations (overrides the config).", "NUMBER");
    opts.optopt("r", "regularization", "Regularization weight (overrides the config).", "NUMBER");
    opts.optopt("", "alpha", "Confidence scaling of play counts (overrides the config).",
        "NUMBER");
    opts.optopt("s", "seed", "Random seed (overrides the config).", "NUMBER");
    opts.optopt("p", "threads", "Number of threads (optional, defaults to the number of CPUs).",
        "NUMBER");
    opts.optflag("", "include-known", "Also recommend artists the user already listened to.");
    opts.optflag("h", "help", "Print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(failure) => {
            let hint = failure.to_string();
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    if matches.opt_present("h") {
        return print_usage_and_exit(&program, opts, None);
    }

    let interactions_path = match matches.opt_str("i") {
        Some(path) => path,
        None => {
            return print_usage_and_exit(
                &program,
                opts,
                Some("Please specify an inputfile via --inputfile."),
            );
        },
    };

    let options = match options_from(&matches) {
        Ok(options) => options,
        Err(failure) => return print_usage_and_exit(&program, opts, Some(&failure)),
    };

    let n: usize = match matches.opt_get_default("n", 10) {
        Ok(n) => n,
        Err(failure) => {
            let hint = format!("Problem with option 'n': {}", failure.to_string());
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let pool_size: usize = match matches.opt_get_default("p", num_cpus::get()) {
        Ok(pool_size) => pool_size,
        Err(failure) => {
            let hint = format!("Problem with option 'p': {}", failure.to_string());
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let user: Option<u64> = match matches.opt_get("u") {
        Ok(user) => user,
        Err(failure) => {
            let hint = format!("Problem with option 'u': {}", failure.to_string());
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let result = compute_recommendations(
        &interactions_path,
        matches.opt_str("a"),
        matches.opt_str("o"),
        user,
        n,
        pool_size,
        &options,
    );

    if let Err(failure) = result {
        error!("{}", failure);
        process::exit(1);
    }
}

fn print_usage_and_exit(
    program: &str,
    opts: Opts,
    hint: Option<&str>
) {

    if let Some(hint) = hint {
        eprintln!("\n{}\n", hint);
    }

    let brief = format!("Usage: {} [options]", program);
    eprint!("{}", opts.usage(&brief));
    process::exit(2);
}

/// Starts from the config file (or the defaults) and applies the overrides from the command line.
fn options_from(matches: &Matches) -> Result<Options, String> {

    let mut options = match matches.opt_str("c") {
        Some(path) => io::read_options(&path)
            .map_err(|failure| format!("Problem with config {}: {}", path, failure))?,
        None => Options::default(),
    };

    override_with(matches, "f", &mut options.num_factors)?;
    override_with(matches, "t", &mut options.num_iterations)?;
    override_with(matches, "r", &mut options.regularization)?;
    override_with(matches, "alpha", &mut options.alpha)?;
    override_with(matches, "s", &mut options.random_seed)?;

    if matches.opt_present("include-known") {
        options.filter_known = false;
    }

    Ok(options)
}

fn override_with<T>(matches: &Matches, name: &str, target: &mut T) -> Result<(), String>
    where T: FromStr, T::Err: Display {

    match matches.opt_get::<T>(name) {
        Ok(Some(value)) => {
            *target = value;
            Ok(())
        },
        Ok(None) => Ok(()),
        Err(failure) => Err(format!("Problem with option '{}': {}", name, failure)),
    }
}

fn compute_recommendations(
    interactions_path: &str,
    artists_path: Option<String>,
    recommendations_path: Option<String>,
    user: Option<u64>,
    n: usize,
    pool_size: usize,
    options: &Options,
) -> Result<(), Box<dyn Error>> {

    info!("Reading play counts from {}", interactions_path);

    let mut reader = io::csv_reader_for_file(interactions_path)?;
    let play_counts = io::read_play_counts(&mut reader)?;

    let (matrix, data_dict) = InteractionMatrix::build(play_counts)?;

    info!(
        "Found {} interactions between {} users and {} items.",
        matrix.num_interactions(),
        matrix.num_users(),
        matrix.num_items(),
    );

    info!(
        "Training {} factors with {} iterations on {} threads (regularization {}, alpha {})",
        options.num_factors,
        options.num_iterations,
        pool_size,
        options.regularization,
        options.alpha,
    );

    let training_start = Instant::now();
    let model = recoreco_als::fit(
        &matrix,
        &options.hyperparameters(),
        options.random_seed,
        pool_size,
    )?;
    info!("{}ms training time", utils::to_millis(training_start.elapsed()));

    let recommendations: Vec<(u32, Vec<ScoredItem>)> = match user {
        Some(user) => {
            let user_index = data_dict.user_index(&user)
                .ok_or_else(|| format!("User {} does not occur in {}", user, interactions_path))?;

            let recommended = recoreco_als::recommend(
                &model,
                &matrix,
                user_index as usize,
                n,
                options.filter_known,
            )?;

            vec![(user_index, recommended)]
        },
        None => {
            recoreco_als::recommend_all(&model, &matrix, n, options.filter_known, pool_size)?
                .into_iter()
                .enumerate()
                .map(|(user_index, recommended)| (user_index as u32, recommended))
                .collect()
        },
    };

    let artist_names = match artists_path {
        Some(path) => {
            info!("Reading artist names from {}", path);
            let mut reader = io::csv_reader_for_file(&path)?;
            Some(ArtistNames::from_csv(&mut reader)?)
        },
        None => None,
    };

    info!("Writing recommendations for {} users...", recommendations.len());

    let mut out = io::output(recommendations_path)?;
    io::write_recommendations(
        &mut *out,
        recommendations.iter()
            .map(|(user_index, recommended)| (*user_index, recommended.as_slice())),
        &data_dict,
        artist_names.as_ref(),
    )?;

    Ok(())
}
