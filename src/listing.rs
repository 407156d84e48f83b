//! WebDAV `PROPFIND` multistatus parsing.

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::FetchError;
use crate::types::RemoteEntry;

/// Request body asking for the properties the pipeline uses.
pub(crate) const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:displayname/>
    <D:getcontentlength/>
    <D:getlastmodified/>
    <D:getetag/>
    <D:resourcetype/>
  </D:prop>
</D:propfind>"#;

#[derive(Debug, Default)]
struct PropFindResponse {
    href: String,
    displayname: String,
    content_length: Option<u64>,
    last_modified: Option<String>,
    etag: Option<String>,
    is_collection: bool,
    status_ok: bool,
}

fn local_name(raw: &[u8]) -> Result<String, FetchError> {
    let name = std::str::from_utf8(raw).map_err(|e| FetchError::Listing(e.to_string()))?;
    Ok(name.to_ascii_lowercase())
}

/// Parses an RFC 2822 `getlastmodified` value.
pub(crate) fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Returns the plain files listed in a `Depth: 1` multistatus body.
///
/// Collections (including the listed folder itself) and responses without a
/// `200` propstat are dropped.
pub fn parse_propfind_response(xml_text: &str) -> Result<Vec<RemoteEntry>, FetchError> {
    let mut reader = Reader::from_str(xml_text);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<PropFindResponse> = None;
    let mut current_element = String::new();
    let mut in_propstat = false;
    let mut in_resourcetype = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(e.local_name().as_ref())?;
                match name.as_str() {
                    "response" => current = Some(PropFindResponse::default()),
                    "propstat" => in_propstat = true,
                    "resourcetype" => in_resourcetype = true,
                    "collection" if in_resourcetype => {
                        if let Some(ref mut resp) = current {
                            resp.is_collection = true;
                        }
                    }
                    _ => {}
                }
                current_element = name;
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(e.local_name().as_ref())?;
                if name == "collection" && in_resourcetype {
                    if let Some(ref mut resp) = current {
                        resp.is_collection = true;
                    }
                }
                current_element.clear();
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| FetchError::Listing(err.to_string()))?;
                let text = text.trim();
                if let Some(ref mut resp) = current {
                    match current_element.as_str() {
                        "href" => resp.href = text.to_string(),
                        "displayname" => resp.displayname = text.to_string(),
                        "getcontentlength" => resp.content_length = text.parse().ok(),
                        "getlastmodified" => resp.last_modified = Some(text.to_string()),
                        "getetag" => resp.etag = Some(text.trim_matches('"').to_string()),
                        "status" if in_propstat => {
                            if text.contains(" 200") {
                                resp.status_ok = true;
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.local_name().as_ref())?;
                match name.as_str() {
                    "response" => {
                        if let Some(resp) = current.take() {
                            if let Some(entry) = into_entry(resp) {
                                entries.push(entry);
                            }
                        }
                    }
                    "propstat" => in_propstat = false,
                    "resourcetype" => in_resourcetype = false,
                    _ => {}
                }
                current_element.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(FetchError::Listing(e.to_string())),
            _ => {}
        }
    }

    Ok(entries)
}

fn into_entry(resp: PropFindResponse) -> Option<RemoteEntry> {
    if resp.is_collection || !resp.status_ok || resp.href.is_empty() {
        return None;
    }

    // Hrefs are percent-encoded, display names are plain text.
    let name = if resp.displayname.is_empty() {
        let raw = resp.href.trim_end_matches('/').rsplit('/').next().unwrap_or("");
        urlencoding::decode(raw)
            .map(|n| n.into_owned())
            .unwrap_or_else(|_| raw.to_string())
    } else {
        resp.displayname.clone()
    };
    // A name with a separator would escape the staging directory.
    if name.is_empty() || name.contains('/') || name == ".." {
        return None;
    }

    Some(RemoteEntry {
        name,
        size: resp.content_length,
        last_modified: resp.last_modified.as_deref().and_then(parse_http_date),
        etag: resp.etag,
        href: resp.href,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/webdav/Sites/Logs/</d:href>
    <d:propstat>
      <d:prop>
        <d:displayname>Logs</d:displayname>
        <d:resourcetype><d:collection/></d:resourcetype>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/webdav/Sites/Logs/error-blade1%20app.log</d:href>
    <d:propstat>
      <d:prop>
        <d:getcontentlength>1234</d:getcontentlength>
        <d:getlastmodified>Fri, 01 Mar 2024 10:15:00 GMT</d:getlastmodified>
        <d:getetag>"abc123"</d:getetag>
        <d:resourcetype/>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/webdav/Sites/Logs/archive/</d:href>
    <d:propstat>
      <d:prop>
        <d:resourcetype><d:collection/></d:resourcetype>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/webdav/Sites/Logs/gone.log</d:href>
    <d:propstat>
      <d:prop/>
      <d:status>HTTP/1.1 404 Not Found</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

    #[test]
    fn test_parse_skips_collections_and_failed_propstats() {
        let entries = parse_propfind_response(LISTING).unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.href, "/webdav/Sites/Logs/error-blade1%20app.log");
        assert_eq!(entry.name, "error-blade1 app.log");
        assert_eq!(entry.size, Some(1234));
        assert_eq!(entry.etag.as_deref(), Some("abc123"));
        assert_eq!(
            entry.last_modified,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_uppercase_namespace_prefix() {
        let xml = r#"<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/x/a.txt</D:href>
    <D:propstat>
      <D:prop><D:displayname>a.txt</D:displayname><D:getcontentlength>10</D:getcontentlength></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;
        let entries = parse_propfind_response(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[0].size, Some(10));
        assert_eq!(entries[0].last_modified, None);
    }

    #[test]
    fn test_displayname_is_taken_literally() {
        let xml = r#"<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/x/report%2520final.txt</d:href>
    <d:propstat>
      <d:prop><d:displayname>report%20final.txt</d:displayname><d:resourcetype/></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;
        let entries = parse_propfind_response(xml).unwrap();
        assert_eq!(entries[0].name, "report%20final.txt");
    }

    #[test]
    fn test_empty_folder() {
        let xml = r#"<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/x/</d:href>
    <d:propstat>
      <d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;
        assert!(parse_propfind_response(xml).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_xml() {
        let err = parse_propfind_response("<d:multistatus><d:response></d:oops>").unwrap_err();
        assert!(matches!(err, FetchError::Listing(_)));
    }

    #[test]
    fn test_http_date() {
        assert!(parse_http_date("not a date").is_none());
        assert!(parse_http_date("Tue, 15 Nov 1994 12:45:26 GMT").is_some());
    }
}
