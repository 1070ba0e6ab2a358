// Line renderers for the 20-column display. Each returns exactly the
// text written to one row; the transport handles charset conversion.

use chrono::{NaiveDate, NaiveTime};

pub fn date_line(date: NaiveDate) -> String {
    format!("Date:     {}", date.format("%d.%m.%Y"))
}

pub fn time_line(time: NaiveTime) -> String {
    format!("Time:       {}", time.format("%H:%M:%S"))
}

/// `raw` is the barometer chip temperature in 1/100 °C.
pub fn temperature_line(raw: i16) -> String {
    format!("Temp:       {:5.2} °C", f64::from(raw) / 100.0)
}

/// `raw` is relative humidity in 1/10 %RH.
pub fn humidity_line(raw: u16) -> String {
    format!("Humidity:   {:6.2} %", f64::from(raw) / 10.0)
}
