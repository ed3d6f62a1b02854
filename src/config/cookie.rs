use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CookieError {
    #[error("unknown cookie attribute `{0}`")]
    UnknownAttribute(String),
    #[error("invalid value `{value}` for cookie attribute `{attribute}`")]
    InvalidValue { attribute: String, value: String },
}

/// A cookie as described by one line of a cookie file.
///
/// Only `name` and `value` go on the wire; the remaining attributes are kept
/// so a cookie file can describe cookies exactly the way a browser saw them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<String>,
    pub raw_expires: Option<String>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
    pub raw: Option<String>,
    pub unparsed: Vec<String>,
}

impl Cookie {
    /// Set one attribute by its cookie-file name.
    pub fn set_attribute(&mut self, attribute: &str, value: &str) -> Result<(), CookieError> {
        let value = value.trim();
        match attribute.trim().to_ascii_lowercase().as_str() {
            "name" => self.name = value.to_string(),
            "value" => self.value = value.to_string(),
            "path" => self.path = Some(value.to_string()),
            "domain" => self.domain = Some(value.to_string()),
            "expires" => self.expires = Some(value.to_string()),
            "rawexpires" => self.raw_expires = Some(value.to_string()),
            "maxage" => self.max_age = Some(parse_value(attribute, value)?),
            "secure" => self.secure = parse_flag(attribute, value)?,
            "httponly" => self.http_only = parse_flag(attribute, value)?,
            "raw" => self.raw = Some(value.to_string()),
            "unparsed" => self.unparsed.push(value.to_string()),
            other => return Err(CookieError::UnknownAttribute(other.to_string())),
        }
        Ok(())
    }

    /// `name=value`, as sent in a `Cookie` request header.
    pub fn pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

fn parse_value<T: std::str::FromStr>(attribute: &str, value: &str) -> Result<T, CookieError> {
    value.parse().map_err(|_| CookieError::InvalidValue {
        attribute: attribute.to_string(),
        value: value.to_string(),
    })
}

// an attribute given without a value is a set flag
fn parse_flag(attribute: &str, value: &str) -> Result<bool, CookieError> {
    if value.is_empty() {
        return Ok(true);
    }
    parse_value(attribute, &value.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_known_attributes() {
        let mut cookie = Cookie::default();
        cookie.set_attribute("name", "session").unwrap();
        cookie.set_attribute("Value", " abc123 ").unwrap();
        cookie.set_attribute("path", "/").unwrap();
        cookie.set_attribute("maxage", "3600").unwrap();
        cookie.set_attribute("secure", "true").unwrap();
        cookie.set_attribute("httponly", "").unwrap();

        assert_eq!(cookie.pair(), "session=abc123");
        assert_eq!(cookie.path.as_deref(), Some("/"));
        assert_eq!(cookie.max_age, Some(3600));
        assert!(cookie.secure);
        assert!(cookie.http_only);
    }

    #[test]
    fn rejects_unknown_attribute() {
        let mut cookie = Cookie::default();
        assert_eq!(
            cookie.set_attribute("color", "blue"),
            Err(CookieError::UnknownAttribute("color".to_string()))
        );
    }

    #[test]
    fn rejects_bad_max_age() {
        let mut cookie = Cookie::default();
        assert!(matches!(
            cookie.set_attribute("maxage", "soon"),
            Err(CookieError::InvalidValue { .. })
        ));
    }
}
