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

use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::io::stdout;
use std::path::Path;

use fnv::FnvHashMap;
use log::{debug, info};

use crate::error::Result;
use crate::options::Options;
use crate::recommend::ScoredItem;
use crate::stats::DataDictionary;

/// Wraps a tab-separated input with a header line. Quoting is disabled, as artist names in the
/// last.fm dump contain stray quotes, and rows may carry more or fewer columns than the header.
pub fn csv_reader<R: io::Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(reader)
}

pub fn csv_reader_for_file(file: &str) -> Result<csv::Reader<File>> {
    let file = File::open(Path::new(file))?;
    Ok(csv_reader(file))
}

/// A line of the play counts file, `userID<TAB>artistID<TAB>weight`.
#[derive(Deserialize)]
struct PlayCount {
    #[serde(rename = "userID")]
    user_id: u64,
    #[serde(rename = "artistID")]
    artist_id: u64,
    weight: f64,
}

/// Reads all `(user, artist, play count)` triples. Malformed lines are errors, we do not skip
/// them silently.
pub fn read_play_counts<R: io::Read>(reader: &mut csv::Reader<R>) -> Result<Vec<(u64, u64, f64)>> {

    let mut play_counts = Vec::new();

    for record in reader.deserialize() {
        let play_count: PlayCount = record?;
        play_counts.push((play_count.user_id, play_count.artist_id, play_count.weight));
    }

    info!("Read {} play counts", play_counts.len());

    Ok(play_counts)
}

/// Resolves raw artist identifiers to display names.
pub struct ArtistNames {
    names: FnvHashMap<u64, String>,
}

impl ArtistNames {

    /// Reads the artists file, `id<TAB>name<TAB>url<TAB>pictureURL`. Only the first two columns
    /// are used, rows may leave out the urls.
    pub fn from_csv<R: io::Read>(reader: &mut csv::Reader<R>) -> Result<Self> {

        let mut names: FnvHashMap<u64, String> =
            FnvHashMap::with_capacity_and_hasher(1000, Default::default());

        for record in reader.records() {
            let mut record = record?;
            record.truncate(2);

            let (artist_id, name): (u64, String) = record.deserialize(None)?;
            names.insert(artist_id, name);
        }

        info!("Read names for {} artists", names.len());

        Ok(ArtistNames { names })
    }

    pub fn name(&self, artist_id: u64) -> Option<&str> {
        self.names.get(&artist_id).map(|name| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Struct used for JSON serialization of recommendations. Field names will be used in JSON.
#[derive(Serialize)]
struct Recommendations<'a> {
    for_user: u64,
    recommendations: Vec<Recommendation<'a>>,
}

#[derive(Serialize)]
struct Recommendation<'a> {
    item: u64,
    name: Option<&'a str>,
    score: f64,
}

/// Opens the file at `path` for writing, or stdout if there is no path.
pub fn output(path: Option<String>) -> io::Result<Box<dyn Write>> {
    match path {
        Some(path) => Ok(Box::new(File::create(&Path::new(&path))?)),
        _ => Ok(Box::new(stdout())),
    }
}

/// Outputs recommendations as JSON lines, one line per user, using the original identifiers from
/// the input file and the artist names if we have them.
pub fn write_recommendations<'a, W, I>(
    out: &mut W,
    recommendations: I,
    data_dict: &DataDictionary<u64>,
    artist_names: Option<&ArtistNames>,
) -> Result<()>
    where W: Write + ?Sized,
          I: IntoIterator<Item=(u32, &'a [ScoredItem])> {

    let mut num_users_written = 0;

    for (user_index, scored_items) in recommendations {

        let for_user = match data_dict.user_id(user_index) {
            Some(user) => *user,
            None => continue,
        };

        let recommendations: Vec<Recommendation> = scored_items.iter()
            .filter_map(|scored_item| {
                data_dict.item_id(scored_item.item).map(|artist_id| {
                    Recommendation {
                        item: *artist_id,
                        name: artist_names.and_then(|names| names.name(*artist_id)),
                        score: scored_item.score,
                    }
                })
            })
            .collect();

        let line = serde_json::to_string(&Recommendations { for_user, recommendations })?;
        writeln!(out, "{}", line)?;

        num_users_written += 1;
    }

    debug!("Wrote recommendations for {} users", num_users_written);

    Ok(())
}

/// Reads options from a JSON file, absent fields keep their defaults.
pub fn read_options(file: &str) -> Result<Options> {
    let reader = io::BufReader::new(File::open(Path::new(file))?);
    let options = serde_json::from_reader(reader)?;

    Ok(options)
}
