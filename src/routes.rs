use actix_web::{http::StatusCode, web, HttpResponse, Responder, ResponseError};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use log::{info, error, debug, warn};

use crate::config::Config;
use crate::error::{AppError, ErrorResponse, Result};
use crate::recommend::{self, RecommendRequest, MISSING_PREFERENCES};
use crate::{google_places, openai, page, utils};

const MAX_FETCH_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct PlaceIdQuery {
    #[serde(rename = "placeName")]
    place_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaceDetailsQuery {
    #[serde(rename = "placeId")]
    place_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FindPlaceQuery {
    input: Option<String>,
    locationbias: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    #[serde(default)]
    prompt: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/health", web::get().to(health_check))
        .route("/recommend", web::post().to(recommend_form))
        .route("/api/recommend", web::post().to(recommend_json))
        .route("/api/getPlaceId", web::get().to(get_place_id))
        .route("/api/getPlaceDetails", web::get().to(get_place_details))
        .route("/api/findplace", web::get().to(find_place))
        .route("/api/expandUrl", web::get().to(expand_url))
        .route("/api/openai", web::post().to(ask_openai))
        .route("/api/fetchUrl", web::get().to(fetch_url));
}

fn new_request_id() -> String {
    chrono::Utc::now().format("%Y%m%d%H%M%S%f").to_string()
}

fn required(value: Option<String>, message: &str) -> Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::InvalidInput(message.to_string()))
}

fn html(status: StatusCode, body: String) -> HttpResponse {
    HttpResponse::build(status).content_type("text/html; charset=utf-8").body(body)
}

async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "message": "Server is running"
    }))
}

async fn index() -> impl Responder {
    html(StatusCode::OK, page::render_form(&RecommendRequest::default(), None))
}

async fn embedded_content(client: &Client, config: &Config, request_id: &str, link: Option<&str>) -> Option<String> {
    let link = link.filter(|_| config.embed_result_page)?;
    match utils::fetch_url_content(client, link, MAX_FETCH_BYTES).await {
        Ok(content) => Some(content),
        Err(e) => {
            warn!("Request {}: Failed to fetch {} for embedding: {}", request_id, link, e);
            None
        }
    }
}

async fn recommend_form(
    form: web::Form<RecommendRequest>,
    client: web::Data<Client>,
    config: web::Data<Config>,
) -> impl Responder {
    let request_id = new_request_id();
    info!("Request {}: Recommendation form submitted", request_id);
    let request = form.into_inner();

    if request.preferences.trim().is_empty() {
        debug!("Request {}: Preferences missing", request_id);
        return html(
            StatusCode::BAD_REQUEST,
            page::render_form(&request, Some(MISSING_PREFERENCES)),
        );
    }

    match recommend::recommend(&client, &config, &request_id, &request).await {
        Ok(recommendation) => {
            let embedded = embedded_content(&client, &config, &request_id, recommendation.link.as_deref()).await;
            info!("Request {}: Recommendation rendered", request_id);
            html(
                StatusCode::OK,
                page::render_recommendation(&recommendation, embedded.as_deref()),
            )
        }
        Err(e) => {
            error!("Request {}: Recommendation failed: {}", request_id, e);
            html(e.status_code(), page::render_error(&e.to_string()))
        }
    }
}

async fn recommend_json(
    body: web::Bytes,
    client: web::Data<Client>,
    config: web::Data<Config>,
) -> HttpResponse {
    let request_id = new_request_id();
    info!("Request {}: Recommendation API request received", request_id);
    debug!("Request {}: Raw request body: {}", request_id, String::from_utf8_lossy(&body));

    let request = match serde_json::from_slice::<RecommendRequest>(&body) {
        Ok(request) => request,
        Err(e) => {
            let error_msg = format!("Invalid request format: {}", e);
            error!("Request {}: {}", request_id, error_msg);
            return HttpResponse::BadRequest().json(ErrorResponse {
                error: error_msg,
                expected_format: json!({
                    "preferences": "I want Japanese food",
                    "restaurants": "Takumi Eindhoven, https://maps.app.goo.gl/example",
                    "location": "Eindhoven"
                }),
            });
        }
    };

    match recommend::recommend(&client, &config, &request_id, &request).await {
        Ok(recommendation) => HttpResponse::Ok().json(recommendation),
        Err(e) => {
            error!("Request {}: Recommendation failed: {}", request_id, e);
            e.error_response()
        }
    }
}

async fn get_place_id(
    query: web::Query<PlaceIdQuery>,
    client: web::Data<Client>,
    config: web::Data<Config>,
) -> Result<HttpResponse> {
    let place_name = required(query.into_inner().place_name, "placeName parameter is required")?;
    let place_id = google_places::find_place_id(&client, &config, &place_name).await?;
    Ok(HttpResponse::Ok().json(json!({ "placeId": place_id })))
}

async fn get_place_details(
    query: web::Query<PlaceDetailsQuery>,
    client: web::Data<Client>,
    config: web::Data<Config>,
) -> Result<HttpResponse> {
    let place_id = required(query.into_inner().place_id, "placeId parameter is required")?;
    let details = google_places::get_place_details_raw(&client, &config, &place_id).await?;
    Ok(HttpResponse::Ok().json(details))
}

async fn find_place(
    query: web::Query<FindPlaceQuery>,
    client: web::Data<Client>,
    config: web::Data<Config>,
) -> Result<HttpResponse> {
    let FindPlaceQuery { input, locationbias } = query.into_inner();
    let input = required(input, "Input parameter is required")?;
    let response = google_places::find_place(&client, &config, &input, locationbias.as_deref()).await?;
    Ok(HttpResponse::Ok().json(response))
}

async fn expand_url(query: web::Query<UrlQuery>) -> Result<HttpResponse> {
    let url = required(query.into_inner().url, "URL parameter is required and must be a string")?;
    let sanitized_url = utils::validate_and_sanitize_url(&url).map_err(AppError::InvalidInput)?;
    info!("Expanding sanitized URL: {}", sanitized_url);
    let expanded_url = utils::expand_short_url(&sanitized_url).await?;
    Ok(HttpResponse::Ok().json(json!({ "expandedUrl": expanded_url })))
}

async fn ask_openai(
    body: web::Json<PromptRequest>,
    client: web::Data<Client>,
    config: web::Data<Config>,
) -> Result<HttpResponse> {
    let prompt = required(Some(body.into_inner().prompt), "prompt is required")?;
    let answer = openai::chat(&client, &config, &prompt).await?;
    Ok(HttpResponse::Ok().json(json!({ "response": answer })))
}

async fn fetch_url(query: web::Query<UrlQuery>, client: web::Data<Client>) -> Result<HttpResponse> {
    let url = required(query.into_inner().url, "URL is required")?;
    let content = utils::fetch_url_content(&client, &url, MAX_FETCH_BYTES).await?;
    Ok(HttpResponse::Ok().json(json!({ "content": content })))
}
