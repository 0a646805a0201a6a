use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use log::{info, error, debug};

use crate::config::Config;
use crate::error::{AppError, Result};

const DETAILS_FIELDS: &str = "place_id,name,formatted_address,geometry,international_phone_number,website,opening_hours,rating,reviews,user_ratings_total,price_level,url";
const FIND_PLACE_FIELDS: &str = "place_id,name,formatted_address,geometry";
const MAX_REVIEWS: usize = 3;
const MAX_PRICE_LEVEL: u64 = 4;

/// How a restaurant is identified before its details are looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceRef {
    PlaceId(String),
    Ftid(String),
    Query(String),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Review {
    pub author: String,
    pub rating: Option<f64>,
    pub text: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlaceDetails {
    pub place_id: Option<String>,
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub rating: Option<f64>,
    pub user_ratings_total: Option<u64>,
    pub price_level: String,
    pub opening_hours: Vec<String>,
    pub reviews: Vec<Review>,
    pub location: Option<Location>,
    pub google_maps_link: Option<String>,
}

pub async fn get_place_details(client: &Client, config: &Config, place: &PlaceRef) -> Result<PlaceDetails> {
    info!("Getting place details for: {:?}", place);
    let response = match place {
        PlaceRef::PlaceId(id) => details_request(client, config, "place_id", id).await?,
        PlaceRef::Ftid(ftid) => details_request(client, config, "ftid", ftid).await?,
        PlaceRef::Query(query) => {
            let place_id = find_place_id(client, config, query).await?;
            details_request(client, config, "place_id", &place_id).await?
        }
    };

    let details = process_place_details(&response["result"])?;
    debug!("Retrieved place details: {:?}", details);
    Ok(details)
}

/// Raw Place Details response, as returned by Google.
pub async fn get_place_details_raw(client: &Client, config: &Config, place_id: &str) -> Result<Value> {
    details_request(client, config, "place_id", place_id).await
}

pub async fn find_place_id(client: &Client, config: &Config, place_name: &str) -> Result<String> {
    debug!("Finding place id for: {}", place_name);
    let params = [
        ("input", place_name),
        ("inputtype", "textquery"),
        ("fields", "place_id"),
        ("key", config.google_api_key.as_str()),
    ];
    let response = places_get(client, config, "findplacefromtext", &params).await?;

    response["candidates"][0]["place_id"]
        .as_str()
        .map(String::from)
        .ok_or_else(|| AppError::NotFound(format!("No place found for {}", place_name)))
}

pub async fn find_place(client: &Client, config: &Config, input: &str, locationbias: Option<&str>) -> Result<Value> {
    let mut params = vec![
        ("input", input),
        ("inputtype", "textquery"),
        ("fields", FIND_PLACE_FIELDS),
        ("key", config.google_api_key.as_str()),
    ];
    if let Some(bias) = locationbias {
        params.push(("locationbias", bias));
    }
    places_get(client, config, "findplacefromtext", &params).await
}

/// Place ids of every Find Place candidate for a free-text search.
pub fn candidate_place_ids(response: &Value) -> Vec<String> {
    response["candidates"]
        .as_array()
        .map(|candidates| {
            candidates
                .iter()
                .filter_map(|c| c["place_id"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

async fn details_request(client: &Client, config: &Config, id_param: &str, id: &str) -> Result<Value> {
    let params = [
        (id_param, id),
        ("fields", DETAILS_FIELDS),
        ("key", config.google_api_key.as_str()),
    ];
    places_get(client, config, "details", &params).await
}

async fn places_get(client: &Client, config: &Config, endpoint: &str, params: &[(&str, &str)]) -> Result<Value> {
    let url = config.places_url(endpoint);
    debug!("Requesting Google Places {} with input {:?}", endpoint, params.first());

    let response = client.get(&url).query(params).send().await?.json::<Value>().await?;

    if let Some(error_message) = response["error_message"].as_str() {
        error!("Google Places API error: {}. Full response: {:?}", error_message, response);
        return Err(AppError::upstream("Google Places", error_message));
    }
    match response["status"].as_str() {
        None | Some("OK") | Some("ZERO_RESULTS") => Ok(response),
        Some("NOT_FOUND") => Err(AppError::NotFound("Place not found".to_string())),
        Some(status) => {
            error!("Google Places API returned status {}", status);
            Err(AppError::upstream("Google Places", status))
        }
    }
}

fn process_place_details(details: &Value) -> Result<PlaceDetails> {
    let name = match details["name"].as_str() {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => {
            error!("Failed to retrieve place details: Unknown place");
            return Err(AppError::NotFound("Place details not found: Unknown place".to_string()));
        }
    };

    let price_level = match details["price_level"].as_u64() {
        Some(level) => "💵".repeat(level.min(MAX_PRICE_LEVEL) as usize),
        None => "❓".to_string(),
    };

    let opening_hours = details["opening_hours"]["weekday_text"]
        .as_array()
        .map(|days| days.iter().filter_map(|d| d.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let reviews = details["reviews"]
        .as_array()
        .map(|reviews| {
            reviews
                .iter()
                .take(MAX_REVIEWS)
                .map(|r| Review {
                    author: r["author_name"].as_str().unwrap_or("Anonymous").to_string(),
                    rating: r["rating"].as_f64(),
                    text: r["text"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let geometry = &details["geometry"]["location"];
    let location = match (geometry["lat"].as_f64(), geometry["lng"].as_f64()) {
        (Some(lat), Some(lng)) => Some(Location { lat, lng }),
        _ => None,
    };

    Ok(PlaceDetails {
        place_id: details["place_id"].as_str().map(String::from),
        name,
        address: details["formatted_address"].as_str().unwrap_or("No address available").to_string(),
        phone: details["international_phone_number"].as_str().map(String::from),
        website: details["website"].as_str().map(String::from),
        rating: details["rating"].as_f64(),
        user_ratings_total: details["user_ratings_total"].as_u64(),
        price_level,
        opening_hours,
        reviews,
        location,
        google_maps_link: details["url"].as_str().map(String::from),
    })
}
