use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use regex::Regex;
use log::{info, debug, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::google_places::{self, PlaceDetails, PlaceRef};
use crate::openai;
use crate::utils;

lazy_static::lazy_static! {
    static ref LIST_MARKER_RE: Regex = Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s*").unwrap();
}

pub const MISSING_PREFERENCES: &str = "What are your preferences for today?";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub preferences: String,
    #[serde(default)]
    pub restaurants: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl RecommendRequest {
    pub fn restaurants(&self) -> Option<&str> {
        non_blank(self.restaurants.as_deref())
    }

    pub fn location(&self) -> Option<&str> {
        non_blank(self.location.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEntry {
    Link(String),
    Name(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub label: String,
    pub details: PlaceDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub answer: String,
    pub restaurant: Option<String>,
    pub link: Option<String>,
    pub candidates: Vec<Candidate>,
}

/// Candidates in insertion order, unique by place id, at most `limit` of them.
struct CandidateSet {
    limit: usize,
    items: Vec<Candidate>,
}

impl CandidateSet {
    fn new(limit: usize) -> Self {
        Self { limit, items: Vec::new() }
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.limit
    }

    fn push(&mut self, label: String, details: PlaceDetails) -> bool {
        if self.is_full() {
            return false;
        }
        let duplicate = self.items.iter().any(|c| match (&c.details.place_id, &details.place_id) {
            (Some(a), Some(b)) => a == b,
            _ => c.details.name == details.name && c.details.address == details.address,
        });
        if duplicate {
            debug!("Skipping duplicate restaurant {}", details.name);
            return false;
        }
        self.items.push(Candidate { label, details });
        true
    }
}

/// Google-Maps links come first, then the remaining text split into names.
/// Other websites are reduced to a searchable name.
pub fn parse_restaurant_list(text: &str) -> Vec<ListEntry> {
    let links = utils::extract_links(text);
    let mut rest = text.to_string();
    for link in &links {
        rest = rest.replacen(link.as_str(), "\n", 1);
    }

    let mut entries = Vec::new();
    let mut websites = Vec::new();
    for link in links {
        if utils::is_google_maps_url(&link) {
            entries.push(ListEntry::Link(link));
        } else if let Some(term) = utils::website_search_term(&link) {
            websites.push(ListEntry::Name(term));
        }
    }

    entries.extend(
        rest.split([',', ';', '\n'])
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| ListEntry::Name(name.to_string())),
    );
    entries.extend(websites);
    entries
}

pub fn summarize_prompt(restaurants: &str) -> String {
    format!(
        "Here is a list of restaurants:\n{}\n\nSummarize the list by providing just the restaurant names in format restaurant1, restaurant2, etc",
        restaurants
    )
}

pub fn recommendation_prompt(restaurants: &Value, preferences: &str) -> String {
    format!(
        "Here is the information about the restaurants that I want you to choose from:\n{}\n\n{}. I want you to give me one name of the restaurant that you recommend. Include its website or Google Maps link in your answer.",
        restaurants,
        preferences.trim().trim_end_matches('.')
    )
}

/// Names from a model answer like "1. Takumi, Dadawan\n- Tony."
pub fn split_summary(answer: &str) -> Vec<String> {
    answer
        .split([',', '\n'])
        .map(|part| LIST_MARKER_RE.replace(part, "").trim().trim_end_matches('.').trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

pub fn extract_url(answer: &str) -> Option<String> {
    utils::extract_links(answer).into_iter().next()
}

/// The candidate mentioned in the answer; the longest matching name wins.
pub fn match_restaurant<'a>(answer: &str, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
    let answer = answer.to_lowercase();
    candidates
        .iter()
        .filter(|c| {
            let name = c.details.name.to_lowercase();
            !name.is_empty() && answer.contains(&name)
        })
        .max_by_key(|c| c.details.name.chars().count())
}

/// Keyed by restaurant name; branches sharing a name get their address appended.
fn candidates_json(candidates: &[Candidate]) -> Value {
    let mut map = Map::new();
    for candidate in candidates {
        let details = serde_json::to_value(&candidate.details).unwrap_or(Value::Null);
        let mut key = candidate.details.name.clone();
        if map.contains_key(&key) {
            key = format!("{} ({})", candidate.details.name, candidate.details.address);
        }
        if map.contains_key(&key) {
            key = format!("{} #{}", key, map.len() + 1);
        }
        map.insert(key, details);
    }
    Value::Object(map)
}

async fn resolve_link(client: &Client, config: &Config, link: &str) -> Result<PlaceDetails> {
    let expanded = if link.contains("goo.gl/") {
        utils::expand_short_url(link).await?
    } else {
        link.to_string()
    };
    let place = utils::extract_place_info(&expanded)?;
    google_places::get_place_details(client, config, &place).await
}

async fn names_to_search(client: &Client, config: &Config, request_id: &str, names: Vec<String>) -> Vec<String> {
    if !config.summarize_with_llm || names.is_empty() {
        return names;
    }
    match openai::chat(client, config, &summarize_prompt(&names.join("\n"))).await {
        Ok(answer) => {
            let summarized = split_summary(&answer);
            info!("Request {}: Summarized list into {:?}", request_id, summarized);
            if summarized.is_empty() { names } else { summarized }
        }
        Err(e) => {
            warn!("Request {}: Failed to summarize restaurant list: {}", request_id, e);
            names
        }
    }
}

pub async fn collect_candidates(
    client: &Client,
    config: &Config,
    request_id: &str,
    request: &RecommendRequest,
) -> Result<Vec<Candidate>> {
    let mut set = CandidateSet::new(config.max_restaurants);

    let entries = request.restaurants().map(parse_restaurant_list).unwrap_or_default();
    if entries.is_empty() {
        let query = match request.location() {
            Some(location) => format!("{} restaurant in {}", request.preferences.trim(), location),
            None => format!("{} restaurant", request.preferences.trim()),
        };
        info!("Request {}: No restaurant list, searching for {}", request_id, query);
        let response = google_places::find_place(client, config, &query, None).await?;
        for place_id in google_places::candidate_place_ids(&response) {
            if set.is_full() {
                break;
            }
            match google_places::get_place_details(client, config, &PlaceRef::PlaceId(place_id.clone())).await {
                Ok(details) => {
                    set.push(details.name.clone(), details);
                }
                Err(e) => warn!("Request {}: Failed to get details for {}: {}", request_id, place_id, e),
            }
        }
        return Ok(set.items);
    }

    let mut names = Vec::new();
    for entry in entries {
        match entry {
            ListEntry::Name(name) => names.push(name),
            ListEntry::Link(link) => {
                if set.is_full() {
                    continue;
                }
                match resolve_link(client, config, &link).await {
                    Ok(details) => {
                        set.push(details.name.clone(), details);
                    }
                    Err(e) => warn!("Request {}: Failed to resolve {}: {}", request_id, link, e),
                }
            }
        }
    }

    for name in names_to_search(client, config, request_id, names).await {
        if set.is_full() {
            info!("Request {}: Reached the limit of {} restaurants", request_id, config.max_restaurants);
            break;
        }
        match google_places::get_place_details(client, config, &PlaceRef::Query(name.clone())).await {
            Ok(details) => {
                set.push(name, details);
            }
            Err(e) => warn!("Request {}: Failed to get details for {}: {}", request_id, name, e),
        }
    }

    Ok(set.items)
}

pub async fn recommend(
    client: &Client,
    config: &Config,
    request_id: &str,
    request: &RecommendRequest,
) -> Result<Recommendation> {
    if request.preferences.trim().is_empty() {
        return Err(AppError::InvalidInput(MISSING_PREFERENCES.to_string()));
    }

    let candidates = collect_candidates(client, config, request_id, request).await?;
    if candidates.is_empty() {
        return Err(AppError::NotFound("None of the restaurants could be found".to_string()));
    }
    info!("Request {}: Collected {} restaurants", request_id, candidates.len());

    let prompt = recommendation_prompt(&candidates_json(&candidates), &request.preferences);
    let answer = openai::chat(client, config, &prompt).await?;

    let matched = match_restaurant(&answer, &candidates);
    let link = extract_url(&answer).or_else(|| {
        matched.and_then(|c| c.details.website.clone().or_else(|| c.details.google_maps_link.clone()))
    });
    let restaurant = matched.map(|c| c.details.name.clone());

    info!("Request {}: Recommended {:?} with link {:?}", request_id, restaurant, link);
    Ok(Recommendation { answer, restaurant, link, candidates })
}
