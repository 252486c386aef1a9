//! Turns ranked raw records into the response payload.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::config::PRICE_HISTORY_DAYS;
use crate::geo::distance_km;
use crate::types::{
    DisplayMarket, Language, MarketPriceResponse, MarketQuote, MarketRecord,
    MarketRecordWithDistance, MarketTrend, PriceAnalysis, PriceHistoryEntry, PriceTrend,
};

pub const PRICE_UNIT: &str = "per kg";

/// Relative change between the last two history weeks that counts as a trend.
const TREND_THRESHOLD_PCT: f64 = 3.0;
const TREND_WINDOW: usize = 7;

/// "tOMATO" → "Tomato". First char uppercased, rest lowercased.
pub fn format_crop_name(crop: &str) -> String {
    let crop = crop.trim();
    let mut chars = crop.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn midnight(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

/// Normalizes upstream arrival dates to ISO-8601 UTC. Falls back to `now` for
/// "TODAY" and for anything unparseable; never fails.
pub fn normalize_date(raw: &str, now: DateTime<Utc>) -> String {
    let s = raw.trim();
    if s.eq_ignore_ascii_case("today") {
        return iso(now);
    }

    if s.contains('/') {
        let parts: Vec<&str> = s.split('/').collect();
        if let [d, m, y] = parts.as_slice() {
            let parsed = match (
                y.trim().parse::<i32>(),
                m.trim().parse::<u32>(),
                d.trim().parse::<u32>(),
            ) {
                (Ok(y), Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(y, m, d).and_then(midnight),
                _ => None,
            };
            if let Some(dt) = parsed {
                return iso(dt);
            }
        }
        return iso(now);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return iso(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return iso(dt.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%d-%m-%Y"] {
        if let Some(dt) = NaiveDate::parse_from_str(s, fmt).ok().and_then(midnight) {
            return iso(dt);
        }
    }
    iso(now)
}

/// Annotates records with distance from the requester, nearest first, and keeps `limit`.
/// Records without coordinates are measured from (0, 0).
pub fn rank_by_distance(
    records: Vec<MarketRecord>,
    lat: f64,
    lon: f64,
    limit: usize,
) -> Vec<MarketRecordWithDistance> {
    let mut ranked: Vec<MarketRecordWithDistance> = records
        .into_iter()
        .map(|record| {
            let distance_km = distance_km(
                lat,
                lon,
                record.latitude.unwrap_or(0.0),
                record.longitude.unwrap_or(0.0),
            );
            MarketRecordWithDistance { record, distance_km }
        })
        .collect();
    ranked.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    ranked.truncate(limit);
    ranked
}

/// Per-market movement. No per-market history exists, so this is always stable.
pub fn market_trend(_record: &MarketRecord) -> MarketTrend {
    MarketTrend::Stable
}

pub fn to_display_market(item: &MarketRecordWithDistance, now: DateTime<Utc>) -> DisplayMarket {
    let r = &item.record;
    DisplayMarket {
        name: r.market.clone().unwrap_or_else(|| r.district.clone()),
        location: format!("{}, {}", r.district, r.state),
        distance: round_to(item.distance_km, 1),
        price: r.modal_price,
        unit: PRICE_UNIT.to_string(),
        date: normalize_date(&r.arrival_date, now),
        trend: market_trend(r),
        change_percent: 0.0,
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Unweighted mean price with first-occurrence highest/lowest. None when empty.
pub fn price_stats(markets: &[DisplayMarket]) -> Option<(f64, MarketQuote, MarketQuote)> {
    let first = markets.first()?;
    let mut highest = first;
    let mut lowest = first;
    let mut sum = 0.0;
    for m in markets {
        sum += m.price;
        if m.price > highest.price {
            highest = m;
        }
        if m.price < lowest.price {
            lowest = m;
        }
    }
    let average = sum / markets.len() as f64;
    let quote = |m: &DisplayMarket| MarketQuote { market: m.name.clone(), price: m.price };
    Some((average, quote(highest), quote(lowest)))
}

/// Synthetic flat history: `PRICE_HISTORY_DAYS` days ending `today`, oldest first.
pub fn price_history(average: f64, today: NaiveDate) -> Vec<PriceHistoryEntry> {
    (0..PRICE_HISTORY_DAYS)
        .rev()
        .map(|days_ago| PriceHistoryEntry {
            date: (today - Duration::days(days_ago)).format("%Y-%m-%d").to_string(),
            avg_price: average,
        })
        .collect()
}

/// Compares the last week of history with the week before it.
pub fn history_trend(history: &[PriceHistoryEntry]) -> PriceTrend {
    if history.len() < TREND_WINDOW * 2 {
        return PriceTrend::Stable;
    }
    let mean = |xs: &[PriceHistoryEntry]| xs.iter().map(|e| e.avg_price).sum::<f64>() / xs.len() as f64;
    let split = history.len() - TREND_WINDOW;
    let recent = mean(&history[split..]);
    let older = mean(&history[split - TREND_WINDOW..split]);
    if older <= 0.0 {
        return PriceTrend::Stable;
    }

    let change_pct = (recent - older) / older * 100.0;
    if change_pct > TREND_THRESHOLD_PCT {
        PriceTrend::Rising
    } else if change_pct < -TREND_THRESHOLD_PCT {
        PriceTrend::Falling
    } else {
        PriceTrend::Stable
    }
}

pub fn recommendation(trend: PriceTrend, language: Language) -> &'static str {
    use Language::*;
    match (trend, language) {
        (PriceTrend::Rising, En) => "Prices are rising. Wait 2-3 days for potentially better rates.",
        (PriceTrend::Rising, Hi) => "कीमतें बढ़ रही हैं। 2-3 दिन प्रतीक्षा करें, बेहतर दाम मिल सकते हैं।",
        (PriceTrend::Rising, Ta) => "விலைகள் அதிகரித்து வருகின்றன. 2-3 நாட்கள் காத்திருங்கள், சிறந்த விலை கிடைக்கலாம்.",
        (PriceTrend::Rising, Ml) => "വില കൂടിക്കൊണ്ടിരിക്കുന്നു. 2-3 ദിവസം കാത്തിരിക്കുക, മികച്ച വില ലഭിച്ചേക്കാം.",
        (PriceTrend::Rising, Te) => "ధరలు పెరుగుతున్నాయి. 2-3 రోజులు వేచి ఉండండి, మంచి ధర దొరకవచ్చు.",
        (PriceTrend::Rising, Kn) => "ಬೆಲೆಗಳು ಏರುತ್ತಿವೆ. 2-3 ದಿನ ಕಾಯಿರಿ, ಉತ್ತಮ ಬೆಲೆ ಸಿಗಬಹುದು.",
        (PriceTrend::Falling, En) => "Prices are falling. Good time to sell now.",
        (PriceTrend::Falling, Hi) => "कीमतें गिर रही हैं। अभी बेचना अच्छा समय है।",
        (PriceTrend::Falling, Ta) => "விலைகள் குறைந்து வருகின்றன. இப்போது விற்பது நல்ல நேரம்.",
        (PriceTrend::Falling, Ml) => "വില കുറയുന്നു. ഇപ്പോൾ വിൽക്കുന്നത് നല്ല സമയമാണ്.",
        (PriceTrend::Falling, Te) => "ధరలు తగ్గుతున్నాయి. ఇప్పుడు అమ్మడం మంచి సమయం.",
        (PriceTrend::Falling, Kn) => "ಬೆಲೆಗಳು ಕುಸಿಯುತ್ತಿವೆ. ಈಗ ಮಾರಾಟ ಮಾಡುವುದು ಉತ್ತಮ ಸಮಯ.",
        (PriceTrend::Stable, En) => "Prices are stable. You can sell now or wait 1-2 days.",
        (PriceTrend::Stable, Hi) => "कीमतें स्थिर हैं। आप अभी बेच सकते हैं या 1-2 दिन प्रतीक्षा कर सकते हैं।",
        (PriceTrend::Stable, Ta) => "விலைகள் நிலையாக உள்ளன. நீங்கள் இப்போது விற்கலாம் அல்லது 1-2 நாட்கள் காத்திருக்கலாம்.",
        (PriceTrend::Stable, Ml) => "വില സ്ഥിരമാണ്. നിങ്ങൾക്ക് ഇപ്പോൾ വിൽക്കാം അല്ലെങ്കിൽ 1-2 ദിവസം കാത്തിരിക്കാം.",
        (PriceTrend::Stable, Te) => "ధరలు స్థిరంగా ఉన్నాయి. మీరు ఇప్పుడు అమ్మవచ్చు లేదా 1-2 రోజులు వేచి ఉండవచ్చు.",
        (PriceTrend::Stable, Kn) => "ಬೆಲೆಗಳು ಸ್ಥಿರವಾಗಿವೆ. ನೀವು ಈಗ ಮಾರಾಟ ಮಾಡಬಹುದು ಅಥವಾ 1-2 ದಿನ ಕಾಯಬಹುದು.",
    }
}

/// Full response for already-ranked records. None when `ranked` is empty.
pub fn build_response(
    crop: &str,
    ranked: &[MarketRecordWithDistance],
    language: Language,
    now: DateTime<Utc>,
) -> Option<MarketPriceResponse> {
    let markets: Vec<DisplayMarket> = ranked.iter().map(|r| to_display_market(r, now)).collect();
    let (average, highest, lowest) = price_stats(&markets)?;
    let price_history = price_history(average, now.date_naive());
    let trend = history_trend(&price_history);

    Some(MarketPriceResponse {
        crop: format_crop_name(crop),
        markets,
        price_analysis: PriceAnalysis {
            average,
            highest,
            lowest,
            trend,
            recommendation: recommendation(trend, language).to_string(),
        },
        price_history,
        updated_at: iso(now),
    })
}
