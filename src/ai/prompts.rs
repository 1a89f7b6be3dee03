//! Deterministic prompt construction.
//!
//! Prompts embed a reduced JSON view of the snapshot: location, current
//! conditions, the first 12 hours and the first 7 days, each forecast entry
//! labelled with its local time in the provider-reported zone.

use crate::upstream::{CurrentConditions, DailyForecast, HourlyForecast, WeatherSnapshot};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

const CONTEXT_HOURS: usize = 12;
const CONTEXT_DAYS: usize = 7;

pub fn summary_system(language: &str) -> String {
    format!(
        "You are a meteorologist writing in {language}. Using the JSON data, summarise the \
         current weather and the next 12 hours in 2-4 sentences and state your confidence \
         (Low/Medium/High). Then give at most 4 bullet points of practical advice. Use °C and \
         m/s. Keep a neutral tone, never sensational."
    )
}

pub fn alerts_system(language: &str) -> String {
    format!(
        "You are a weather warning specialist. Analyse the JSON data and reply with a JSON \
         object with the fields: severity (none|low|moderate|high|extreme), headline (in \
         {language}, at most 80 characters), risks (list of objects {{type: \
         heat|rain|wind|uv|visibility|storm, level: integer 1-5, why}}) and advice (list of \
         short sentences in {language})."
    )
}

pub fn question_system(language: &str) -> String {
    format!(
        "You are a weather assistant answering in {language}. Answer in at most 6 sentences \
         using only the JSON data provided, with °C and m/s. If the data does not cover the \
         question, say so plainly instead of guessing."
    )
}

#[derive(Serialize)]
struct ContextLocation<'a> {
    name: Option<&'a str>,
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
struct Stamped<'a, T> {
    local_time: String,
    #[serde(flatten)]
    entry: &'a T,
}

#[derive(Serialize)]
struct Context<'a> {
    location: ContextLocation<'a>,
    timezone: &'a str,
    current: &'a CurrentConditions,
    hourly: Vec<Stamped<'a, HourlyForecast>>,
    daily: Vec<Stamped<'a, DailyForecast>>,
    fetched_at: DateTime<Utc>,
}

fn local_label(ts: i64, tz: Option<Tz>, format: &str) -> String {
    let Some(utc) = DateTime::<Utc>::from_timestamp(ts, 0) else {
        return String::new();
    };
    match tz {
        Some(tz) => utc.with_timezone(&tz).format(format).to_string(),
        None => utc.format(format).to_string(),
    }
}

/// Compact JSON context handed to the model.
pub fn context_json(snapshot: &WeatherSnapshot) -> String {
    let tz: Option<Tz> = snapshot.timezone.as_deref().and_then(|z| z.parse().ok());
    let timezone = match tz {
        Some(_) => snapshot.timezone.as_deref().unwrap_or("UTC"),
        None => "UTC",
    };

    let context = Context {
        location: ContextLocation {
            name: snapshot.location.name.as_deref(),
            lat: snapshot.location.lat,
            lon: snapshot.location.lon,
        },
        timezone,
        current: &snapshot.current,
        hourly: snapshot
            .hourly
            .iter()
            .take(CONTEXT_HOURS)
            .map(|h| Stamped {
                local_time: local_label(h.dt, tz, "%Y-%m-%d %H:%M"),
                entry: h,
            })
            .collect(),
        daily: snapshot
            .daily
            .iter()
            .take(CONTEXT_DAYS)
            .map(|d| Stamped {
                local_time: local_label(d.dt, tz, "%Y-%m-%d"),
                entry: d,
            })
            .collect(),
        fetched_at: snapshot.fetched_at,
    };

    serde_json::to_string(&context).unwrap_or_else(|_| "{}".to_string())
}

pub fn summary_user(context: &str) -> String {
    format!(
        "Below is weather data as JSON. Follow the system instructions to summarise it, state \
         your confidence and give suitable tips.\n```json\n{context}\n```"
    )
}

pub fn alerts_user(context: &str) -> String {
    format!(
        "Extract the weather risks from the following JSON data and reply with JSON as the \
         system instructions describe.\n```json\n{context}\n```"
    )
}

pub fn question_user(context: &str, question: &str) -> String {
    format!(
        "Weather data as JSON:\n```json\n{context}\n```\nQuestion: {}",
        question.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{Condition, DailyTemperature, Location, Units};
    use chrono::TimeZone;

    fn snapshot() -> WeatherSnapshot {
        WeatherSnapshot {
            location: Location::new(21.0278, 105.8342).unwrap().with_name("Hanoi"),
            current: CurrentConditions {
                temp: Some(31.5),
                ..Default::default()
            },
            hourly: (0..12)
                .map(|i| HourlyForecast {
                    dt: 1_700_000_000 + i * 3600,
                    temp: Some(30.0),
                    feels_like: None,
                    humidity: None,
                    wind_speed: None,
                    pop: 0.0,
                    weather: Condition::default(),
                })
                .collect(),
            daily: vec![DailyForecast {
                dt: 1_700_000_000,
                temp: DailyTemperature::default(),
                feels_like: DailyTemperature::default(),
                humidity: None,
                wind_speed: None,
                pop: 0.5,
                weather: Condition::default(),
            }],
            provider: "openweather".into(),
            units: Units::Metric,
            timezone: Some("Asia/Bangkok".into()),
            fetched_at: Utc.with_ymd_and_hms(2023, 11, 14, 22, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_context_is_deterministic() {
        let snap = snapshot();
        assert_eq!(context_json(&snap), context_json(&snap));
    }

    #[test]
    fn test_context_uses_local_time() {
        let json: serde_json::Value = serde_json::from_str(&context_json(&snapshot())).unwrap();
        // 1_700_000_000 is 2023-11-14 22:13 UTC, 05:13 next day in Bangkok.
        assert_eq!(json["hourly"][0]["local_time"], "2023-11-15 05:13");
        assert_eq!(json["hourly"][0]["temp"], 30.0);
        assert_eq!(json["timezone"], "Asia/Bangkok");
        assert_eq!(json["location"]["name"], "Hanoi");
        assert_eq!(json["hourly"].as_array().unwrap().len(), 12);
    }

    #[test]
    fn test_unknown_zone_falls_back_to_utc() {
        let mut snap = snapshot();
        snap.timezone = Some("Mars/Olympus".into());
        let json: serde_json::Value = serde_json::from_str(&context_json(&snap)).unwrap();
        assert_eq!(json["timezone"], "UTC");
        assert_eq!(json["hourly"][0]["local_time"], "2023-11-14 22:13");
    }

    #[test]
    fn test_question_is_trimmed_into_prompt() {
        let prompt = question_user("{}", "  Will it rain tonight? \n");
        assert!(prompt.ends_with("Question: Will it rain tonight?"));
    }

    #[test]
    fn test_language_in_system_prompts() {
        assert!(summary_system("Vietnamese").contains("writing in Vietnamese"));
        assert!(alerts_system("English").contains("headline (in English"));
    }
}
