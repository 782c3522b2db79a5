//! Request body decoding for the settings endpoint
//!
//! Accepts either a JSON object or an `application/x-www-form-urlencoded`
//! body. Both may use the camelCase or the hyphenated key names. Missing
//! keys come out empty, unknown form fields are ignored. JSON string escapes
//! and form percent escapes are decoded before a value is stored.

use thiserror_no_std::Error;

use crate::system::config::{SettingKey, SettingValue, Settings, MAX_VALUE_LEN};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BodyError {
    #[error("body is not valid JSON")]
    InvalidJson,

    #[error("body is not a valid form")]
    InvalidForm,

    #[error("setting value longer than 64 bytes")]
    ValueTooLong,
}

/// Decode a settings body, JSON if it starts with `{`, form encoded otherwise
pub fn parse_settings(body: &[u8]) -> Result<Settings, BodyError> {
    let start = body.iter().position(|b| !b.is_ascii_whitespace());
    match start.map(|i| body[i]) {
        Some(b'{') => parse_json(body),
        _ => parse_form(body),
    }
}

pub fn parse_json(body: &[u8]) -> Result<Settings, BodyError> {
    // scratch space for one unescaped string at a time
    let mut unescaped = [0u8; MAX_VALUE_LEN];
    serde_json_core::from_slice_escaped::<Settings>(body, &mut unescaped)
        .map(|(settings, _)| settings)
        .map_err(|_| BodyError::InvalidJson)
}

pub fn parse_form(body: &[u8]) -> Result<Settings, BodyError> {
    let body = core::str::from_utf8(body).map_err(|_| BodyError::InvalidForm)?;
    let mut settings = Settings::default();

    for pair in body.trim().split('&').filter(|pair| !pair.is_empty()) {
        let (raw_name, raw_value) = pair.split_once('=').unwrap_or((pair, ""));

        let name: heapless::String<32> = match percent_decode(raw_name) {
            Ok(name) => name,
            Err(BodyError::ValueTooLong) => continue,
            Err(err) => return Err(err),
        };
        let value: SettingValue = percent_decode(raw_value)?;

        match SettingKey::from_name(&name).and_then(|key| settings.field_mut(key)) {
            Some(field) => *field = value,
            None => debug!("ignoring form field {}", name.as_str()),
        }
    }

    Ok(settings)
}

/// Decode `%XX` escapes and `+` as space
fn percent_decode<const N: usize>(raw: &str) -> Result<heapless::String<N>, BodyError> {
    let mut bytes = heapless::Vec::<u8, N>::new();
    let mut input = raw.bytes();

    while let Some(byte) = input.next() {
        let decoded = match byte {
            b'+' => b' ',
            b'%' => {
                let hi = input.next().and_then(hex_value).ok_or(BodyError::InvalidForm)?;
                let lo = input.next().and_then(hex_value).ok_or(BodyError::InvalidForm)?;
                hi << 4 | lo
            }
            other => other,
        };
        bytes.push(decoded).map_err(|_| BodyError::ValueTooLong)?;
    }

    heapless::String::from_utf8(bytes).map_err(|_| BodyError::InvalidForm)
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_with_hyphenated_keys() {
        let body = br#"{"ssid":"casa","senha":"segredo","ip-servidor":"10.0.0.2","porta-servidor":"9000","token":"t","inicio-zona-1":"1","fim-zona-1":"2","inicio-zona-2":"3","fim-zona-2":"4","inicio-zona-3":"5","fim-zona-3":"6"}"#;
        let settings = parse_settings(body).unwrap();
        assert_eq!(settings.ssid, "casa");
        assert_eq!(settings.password, "segredo");
        assert_eq!(settings.server_ip, "10.0.0.2");
        assert_eq!(settings.server_port, "9000");
        assert_eq!(settings.zone1_begin, "1");
        assert_eq!(settings.zone3_end, "6");
    }

    #[test]
    fn json_with_camel_case_keys_and_missing_fields() {
        let settings = parse_settings(br#" {"ipServidor":"10.0.0.9"}"#).unwrap();
        assert_eq!(settings.server_ip, "10.0.0.9");
        assert_eq!(settings.ssid, "");
        assert_eq!(settings.token, "");
    }

    #[test]
    fn json_escapes_are_decoded() {
        let body = br#"{"ssid":"a\"b\\c","senha":"cora\u00e7\u00e3o","token":"tab\there"}"#;
        let settings = parse_settings(body).unwrap();
        assert_eq!(settings.ssid, "a\"b\\c");
        assert_eq!(settings.password, "coração");
        assert_eq!(settings.token, "tab\there");
    }

    #[test]
    fn broken_json_is_rejected() {
        assert_eq!(parse_settings(b"{\"ssid\":"), Err(BodyError::InvalidJson));
        assert_eq!(parse_settings(b"{\"ssid\":12}"), Err(BodyError::InvalidJson));
    }

    #[test]
    fn form_body_is_percent_decoded() {
        let body = b"ssid=Minha+Casa&senha=a%26b%3Dc&ip-servidor=192.168.0.10&fimZona2=55&unknown=1";
        let settings = parse_settings(body).unwrap();
        assert_eq!(settings.ssid, "Minha Casa");
        assert_eq!(settings.password, "a&b=c");
        assert_eq!(settings.server_ip, "192.168.0.10");
        assert_eq!(settings.zone2_end, "55");
        assert_eq!(settings.token, "");
    }

    #[test]
    fn form_errors() {
        assert_eq!(parse_settings(b"ssid=%zz"), Err(BodyError::InvalidForm));
        assert_eq!(parse_settings(b"ssid=%4"), Err(BodyError::InvalidForm));
        assert_eq!(parse_settings(b"ssid=%ff"), Err(BodyError::InvalidForm));
        let long = std::format!("token={}", "x".repeat(65));
        assert_eq!(parse_settings(long.as_bytes()), Err(BodyError::ValueTooLong));
    }

    #[test]
    fn empty_body_is_an_empty_form() {
        assert_eq!(parse_settings(b""), Ok(Settings::default()));
    }
}
