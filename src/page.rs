use crate::recommend::{Recommendation, RecommendRequest};

const STYLE: &str = "body{font-family:'Space Grotesk',sans-serif;background:#f3f4f6;display:flex;justify-content:center;padding:24px}\
main{width:100%;max-width:640px;background:#fff;padding:24px;border-radius:8px;box-shadow:0 4px 12px rgba(0,0,0,.1)}\
label{display:block;font-weight:bold;font-size:.9rem;margin-bottom:8px}\
textarea,input{width:100%;padding:8px;border:1px solid #d1d5db;border-radius:4px;box-sizing:border-box}\
.invalid{border-color:#ef4444}.error{color:#ef4444;font-size:.75rem;font-style:italic}\
.field{margin-bottom:16px}button{background:#3b82f6;color:#fff;font-weight:bold;padding:8px 16px;border:0;border-radius:4px}\
iframe{width:100%;height:600px;border:1px solid #d1d5db}";

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n<main>\n{}\n</main>\n</body>\n</html>\n",
        escape_html(title),
        STYLE,
        body
    )
}

/// The preferences form; `error` marks the preferences field invalid.
pub fn render_form(values: &RecommendRequest, error: Option<&str>) -> String {
    let error_html = error
        .map(|e| format!("<p class=\"error\">{}</p>", escape_html(e)))
        .unwrap_or_default();
    let preferences_class = if error.is_some() { " class=\"invalid\"" } else { "" };

    let body = format!(
        r#"<h1>Where should we eat?</h1>
<form method="post" action="/recommend">
<div class="field">
<label for="restaurants">Please paste your restaurant lists (optional):</label>
<textarea id="restaurants" name="restaurants" rows="6" placeholder="Paste your restaurant list or Google Maps links here...">{}</textarea>
</div>
<div class="field">
<label for="preferences">What are your preferences for today?</label>
<textarea id="preferences" name="preferences" rows="3"{} placeholder="Enter your preferences here...">{}</textarea>
{}
</div>
<div class="field">
<label for="location">Where are you? (optional)</label>
<input id="location" name="location" value="{}">
</div>
<button type="submit">Submit</button>
</form>"#,
        escape_html(values.restaurants.as_deref().unwrap_or_default()),
        preferences_class,
        escape_html(&values.preferences),
        error_html,
        escape_html(values.location.as_deref().unwrap_or_default()),
    );
    layout("Dinewise", &body)
}

pub fn render_recommendation(recommendation: &Recommendation, embedded: Option<&str>) -> String {
    let mut body = String::from("<h1>Our recommendation</h1>\n");

    if let Some(name) = &recommendation.restaurant {
        body.push_str(&format!("<h2>{}</h2>\n", escape_html(name)));
    }
    body.push_str(&format!("<p>{}</p>\n", escape_html(&recommendation.answer).replace('\n', "<br>")));
    if let Some(link) = &recommendation.link {
        let link = escape_html(link);
        body.push_str(&format!("<p><a href=\"{0}\" target=\"_blank\" rel=\"noopener\">{0}</a></p>\n", link));
    }

    body.push_str("<h3>Restaurants considered</h3>\n<ul>\n");
    for candidate in &recommendation.candidates {
        let details = &candidate.details;
        let rating = details
            .rating
            .map(|r| format!(" ⭐ {:.1} ({})", r, details.user_ratings_total.unwrap_or(0)))
            .unwrap_or_default();
        body.push_str(&format!(
            "<li><strong>{}</strong> {}{}<br><small>{}</small></li>\n",
            escape_html(&details.name),
            escape_html(&details.price_level),
            rating,
            escape_html(&details.address),
        ));
    }
    body.push_str("</ul>\n");

    if let Some(content) = embedded {
        body.push_str(&format!(
            "<h3>Embedded Content</h3>\n<iframe srcdoc=\"{}\" title=\"Embedded content\" sandbox=\"allow-scripts\"></iframe>\n",
            escape_html(content)
        ));
    }

    body.push_str("<p><a href=\"/\">Ask again</a></p>");
    layout("Dinewise recommendation", &body)
}

pub fn render_error(message: &str) -> String {
    let body = format!(
        "<h1>Something went wrong</h1>\n<p class=\"error\">{}</p>\n<p><a href=\"/\">Try again</a></p>",
        escape_html(message)
    );
    layout("Dinewise error", &body)
}
