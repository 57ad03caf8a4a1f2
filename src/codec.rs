// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Markdown with frontmatter, the on-disk form of every record.
//!
//! A record file looks like this:
//!
//! ```text
//! ---
//! id: REQ-001
//! title: "Login"
//! linkedArtifacts: [{"targetId":"UC-001","type":"satisfies"}]
//! ---
//!
//! # Login
//!
//! Users sign in with a password.
//! ```
//!
//! Frontmatter holds one `key: value` line per field, in the order the
//! record's field table declares. Strings are written as JSON string
//! literals, numbers and booleans bare, and structured values as compact
//! JSON. Decoding is lenient: unknown keys are ignored, missing keys take
//! their default, and malformed JSON falls back to the field's default. A
//! timestamp that is not a number makes the whole record unreadable.

use crate::model::{
    Artifact, ArtifactKind, Information, Link, Project, ProjectBaseline, RecordKind, Requirement,
    Risk, SavedFilter, TestCase, UseCase,
};

use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::{collections::BTreeMap, sync::LazyLock};
use tracing::{debug, warn};

static FRONTMATTER: LazyLock<Regex> = LazyLock::new(|| {
    // INVARIANT: Pattern is a literal and always compiles.
    Regex::new(r"(?s)\A---\r?\n(.*?)\r?\n---(?:\r?\n|\z)").unwrap()
});

/// How a frontmatter value is written and read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// JSON string literal, with a default when missing.
    Str(&'static str),
    /// Milliseconds since epoch, current time when missing.
    Timestamp,
    /// Milliseconds since epoch, omitted when absent.
    OptionalTimestamp,
    Bool,
    /// Compact JSON, with the given JSON default.
    Json(&'static str),
}

/// One frontmatter key of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub key: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn str(key: &'static str) -> Self {
        Self::str_or(key, "")
    }

    pub const fn str_or(key: &'static str, default: &'static str) -> Self {
        Self {
            key,
            kind: FieldKind::Str(default),
        }
    }

    pub const fn timestamp(key: &'static str) -> Self {
        Self {
            key,
            kind: FieldKind::Timestamp,
        }
    }

    pub const fn optional_timestamp(key: &'static str) -> Self {
        Self {
            key,
            kind: FieldKind::OptionalTimestamp,
        }
    }

    pub const fn bool(key: &'static str) -> Self {
        Self {
            key,
            kind: FieldKind::Bool,
        }
    }

    pub const fn json(key: &'static str, default: &'static str) -> Self {
        Self {
            key,
            kind: FieldKind::Json(default),
        }
    }

    /// Render value as the text after `key: `.
    ///
    /// Returns `None` when the field should be left out.
    fn render(&self, value: Option<&Value>) -> Option<String> {
        let value = match value {
            None | Some(Value::Null) => {
                return match self.kind {
                    FieldKind::OptionalTimestamp => None,
                    _ => Some(self.default_value().to_string()),
                }
            }
            Some(value) => value,
        };

        match (self.kind, value) {
            (FieldKind::Str(_), Value::String(text)) => serde_json::to_string(text).ok(),
            (_, value) => serde_json::to_string(value).ok(),
        }
    }

    /// Coerce raw frontmatter text into a JSON value for deserialization.
    ///
    /// # Errors
    ///
    /// - Return [`MalformedField`] if a timestamp is present but is not a
    ///   number.
    fn coerce(&self, raw: Option<&str>) -> std::result::Result<Option<Value>, MalformedField> {
        let Some(raw) = raw else {
            return Ok(match self.kind {
                FieldKind::OptionalTimestamp => None,
                _ => Some(self.default_value()),
            });
        };

        let value = match self.kind {
            FieldKind::Str(_) => Value::String(unquote(raw)),
            FieldKind::Timestamp | FieldKind::OptionalTimestamp => {
                let millis = raw.trim().parse::<i64>().map_err(|_| MalformedField {
                    key: self.key,
                    raw: raw.to_string(),
                })?;
                Value::from(millis)
            }
            FieldKind::Bool => Value::Bool(raw == "true"),
            FieldKind::Json(_) => serde_json::from_str(raw).unwrap_or_else(|err| {
                debug!("field {} has malformed JSON, using default: {err}", self.key);
                self.default_value()
            }),
        };

        Ok(Some(value))
    }

    fn default_value(&self) -> Value {
        match self.kind {
            FieldKind::Str(default) => Value::String(default.to_string()),
            FieldKind::Timestamp => Value::from(crate::model::now_ms()),
            FieldKind::OptionalTimestamp => Value::Null,
            FieldKind::Bool => Value::Bool(false),
            FieldKind::Json(default) => serde_json::from_str(default).unwrap_or(Value::Null),
        }
    }
}

/// Frontmatter value that cannot stand in for its field.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MalformedField {
    key: &'static str,
    raw: String,
}

fn unquote(raw: &str) -> String {
    if raw.starts_with('"') {
        if let Ok(text) = serde_json::from_str::<String>(raw) {
            return text;
        }
    }

    raw.trim_matches('"').to_string()
}

const HEADER_FIELDS: [Field; 10] = [
    Field::str("id"),
    Field::str("title"),
    Field::str_or("revision", crate::ids::INITIAL_REVISION),
    Field::str_or("status", "draft"),
    Field::str_or("priority", "medium"),
    Field::timestamp("dateCreated"),
    Field::timestamp("lastModified"),
    Field::bool("isDeleted"),
    Field::optional_timestamp("deletedAt"),
    Field::json("linkedArtifacts", "[]"),
];

static REQUIREMENT_FIELDS: LazyLock<Vec<Field>> = LazyLock::new(|| {
    with_header(&[
        Field::str("rationale"),
        Field::str("verificationMethod"),
        Field::str("author"),
        Field::json("tags", "[]"),
    ])
});

static USE_CASE_FIELDS: LazyLock<Vec<Field>> = LazyLock::new(|| {
    with_header(&[
        Field::str("actor"),
        Field::str("preconditions"),
        Field::str("postconditions"),
        Field::json("mainFlow", "[]"),
        Field::json("alternativeFlows", "[]"),
    ])
});

static TEST_CASE_FIELDS: LazyLock<Vec<Field>> = LazyLock::new(|| {
    with_header(&[
        Field::json("steps", "[]"),
        Field::str("expectedResult"),
        Field::json("requirementIds", "[]"),
        Field::optional_timestamp("lastExecuted"),
        Field::str("author"),
    ])
});

static INFORMATION_FIELDS: LazyLock<Vec<Field>> =
    LazyLock::new(|| with_header(&[Field::str("infoType")]));

static RISK_FIELDS: LazyLock<Vec<Field>> = LazyLock::new(|| {
    with_header(&[
        Field::str("probability"),
        Field::str("impact"),
        Field::str("mitigation"),
        Field::str("owner"),
    ])
});

const LINK_FIELDS: [Field; 7] = [
    Field::str("id"),
    Field::str("sourceId"),
    Field::str("targetId"),
    Field::str_or("type", "related_to"),
    Field::json("projectIds", "[]"),
    Field::timestamp("dateCreated"),
    Field::timestamp("lastModified"),
];

const SAVED_FILTER_FIELDS: [Field; 5] = [
    Field::str("id"),
    Field::str("name"),
    Field::json("filters", "[]"),
    Field::timestamp("dateCreated"),
    Field::timestamp("lastModified"),
];

const PROJECT_FIELDS: [Field; 8] = [
    Field::str("id"),
    Field::str("name"),
    Field::timestamp("lastModified"),
    Field::json("requirementIds", "[]"),
    Field::json("useCaseIds", "[]"),
    Field::json("testCaseIds", "[]"),
    Field::json("informationIds", "[]"),
    Field::json("riskIds", "[]"),
];

const BASELINE_FIELDS: [Field; 9] = [
    Field::str("id"),
    Field::str("projectId"),
    Field::str("name"),
    Field::str("description"),
    Field::timestamp("timestamp"),
    Field::str_or("version", crate::ids::INITIAL_REVISION),
    Field::json("artifactCommits", "{}"),
    Field::json("addedArtifacts", "[]"),
    Field::json("removedArtifacts", "[]"),
];

fn with_header(extra: &[Field]) -> Vec<Field> {
    HEADER_FIELDS.iter().chain(extra).copied().collect()
}

/// Record type with a Markdown file representation.
pub trait Markdown: Serialize + DeserializeOwned {
    /// Frontmatter keys in write order.
    fn fields() -> &'static [Field];

    /// Field written as the document body instead of frontmatter.
    fn body_key() -> Option<&'static str> {
        None
    }

    /// Keys that must appear for a document to decode.
    fn required() -> &'static [&'static str] {
        &["id"]
    }

    /// Kind that the id prefix must denote.
    fn kind() -> RecordKind;

    /// Text of the level one heading.
    fn heading(&self) -> String;

    fn to_markdown(&self) -> String {
        render(self)
    }

    fn from_markdown(text: &str) -> Option<Self> {
        parse(text)
    }
}

macro_rules! artifact_markdown {
    ($ty:ty, $fields:expr, $kind:expr, $body:literal) => {
        impl Markdown for $ty {
            fn fields() -> &'static [Field] {
                $fields.as_slice()
            }

            fn body_key() -> Option<&'static str> {
                Some($body)
            }

            fn kind() -> RecordKind {
                RecordKind::Artifact($kind)
            }

            fn heading(&self) -> String {
                self.header.title.clone()
            }
        }
    };
}

artifact_markdown!(Requirement, REQUIREMENT_FIELDS, ArtifactKind::Requirement, "text");
artifact_markdown!(UseCase, USE_CASE_FIELDS, ArtifactKind::UseCase, "description");
artifact_markdown!(TestCase, TEST_CASE_FIELDS, ArtifactKind::TestCase, "description");
artifact_markdown!(Information, INFORMATION_FIELDS, ArtifactKind::Information, "content");
artifact_markdown!(Risk, RISK_FIELDS, ArtifactKind::Risk, "description");

impl Markdown for Link {
    fn fields() -> &'static [Field] {
        &LINK_FIELDS
    }

    fn required() -> &'static [&'static str] {
        &["id", "sourceId", "targetId"]
    }

    fn kind() -> RecordKind {
        RecordKind::Link
    }

    fn heading(&self) -> String {
        format!("{} {} {}", self.source_id, self.link_type, self.target_id)
    }
}

impl Markdown for SavedFilter {
    fn fields() -> &'static [Field] {
        &SAVED_FILTER_FIELDS
    }

    fn required() -> &'static [&'static str] {
        &["id", "name"]
    }

    fn kind() -> RecordKind {
        RecordKind::SavedFilter
    }

    fn heading(&self) -> String {
        self.name.clone()
    }
}

impl Markdown for Project {
    fn fields() -> &'static [Field] {
        &PROJECT_FIELDS
    }

    fn body_key() -> Option<&'static str> {
        Some("description")
    }

    fn required() -> &'static [&'static str] {
        &["id", "name"]
    }

    fn kind() -> RecordKind {
        RecordKind::Project
    }

    fn heading(&self) -> String {
        self.name.clone()
    }
}

impl Markdown for ProjectBaseline {
    fn fields() -> &'static [Field] {
        &BASELINE_FIELDS
    }

    fn required() -> &'static [&'static str] {
        &["id", "projectId"]
    }

    fn kind() -> RecordKind {
        RecordKind::Baseline
    }

    fn heading(&self) -> String {
        format!("{} (v{})", self.name, self.version)
    }
}

/// Any record that can be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Artifact(Artifact),
    Link(Link),
    SavedFilter(SavedFilter),
    Project(Project),
    Baseline(ProjectBaseline),
}

impl Record {
    pub fn id(&self) -> &str {
        match self {
            Self::Artifact(artifact) => artifact.id(),
            Self::Link(link) => &link.id,
            Self::SavedFilter(filter) => &filter.id,
            Self::Project(project) => &project.id,
            Self::Baseline(baseline) => &baseline.id,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Artifact(artifact) => RecordKind::Artifact(artifact.kind()),
            Self::Link(_) => RecordKind::Link,
            Self::SavedFilter(_) => RecordKind::SavedFilter,
            Self::Project(_) => RecordKind::Project,
            Self::Baseline(_) => RecordKind::Baseline,
        }
    }

    /// Path of record file relative to repository root.
    pub fn path(&self) -> String {
        self.kind().path(self.id())
    }
}

impl From<Artifact> for Record {
    fn from(artifact: Artifact) -> Self {
        Self::Artifact(artifact)
    }
}

/// Encode any record as Markdown.
pub fn artifact_to_markdown(record: &Record) -> String {
    match record {
        Record::Artifact(Artifact::Requirement(artifact)) => artifact.to_markdown(),
        Record::Artifact(Artifact::UseCase(artifact)) => artifact.to_markdown(),
        Record::Artifact(Artifact::TestCase(artifact)) => artifact.to_markdown(),
        Record::Artifact(Artifact::Information(artifact)) => artifact.to_markdown(),
        Record::Artifact(Artifact::Risk(artifact)) => artifact.to_markdown(),
        Record::Link(link) => link.to_markdown(),
        Record::SavedFilter(filter) => filter.to_markdown(),
        Record::Project(project) => project.to_markdown(),
        Record::Baseline(baseline) => baseline.to_markdown(),
    }
}

/// Decode any record, picking its type from the id prefix.
///
/// Returns `None` for text without frontmatter, an unknown prefix, or
/// missing required keys.
pub fn markdown_to_artifact(text: &str) -> Option<Record> {
    let document = Document::parse(text)?;
    let id = document.fields.get("id").map(|raw| unquote(raw))?;

    let record = match RecordKind::from_id(&id)? {
        RecordKind::Artifact(ArtifactKind::Requirement) => {
            Record::Artifact(Artifact::Requirement(decode(&document)?))
        }
        RecordKind::Artifact(ArtifactKind::UseCase) => {
            Record::Artifact(Artifact::UseCase(decode(&document)?))
        }
        RecordKind::Artifact(ArtifactKind::TestCase) => {
            Record::Artifact(Artifact::TestCase(decode(&document)?))
        }
        RecordKind::Artifact(ArtifactKind::Information) => {
            Record::Artifact(Artifact::Information(decode(&document)?))
        }
        RecordKind::Artifact(ArtifactKind::Risk) => {
            Record::Artifact(Artifact::Risk(decode(&document)?))
        }
        RecordKind::Link => Record::Link(decode(&document)?),
        RecordKind::SavedFilter => Record::SavedFilter(decode(&document)?),
        RecordKind::Project => Record::Project(decode(&document)?),
        RecordKind::Baseline => Record::Baseline(decode(&document)?),
    };

    Some(record)
}

/// Decode a record of known type.
pub fn markdown_to<T: Markdown>(text: &str) -> Option<T> {
    T::from_markdown(text)
}

/// Decode an artifact of any kind.
pub fn markdown_to_any_artifact(text: &str) -> Option<Artifact> {
    match markdown_to_artifact(text)? {
        Record::Artifact(artifact) => Some(artifact),
        _ => None,
    }
}

fn render<T: Markdown>(record: &T) -> String {
    let map = match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            warn!("record could not be flattened into frontmatter");
            Map::new()
        }
    };

    let mut text = String::from("---\n");
    for field in T::fields() {
        if let Some(value) = field.render(map.get(field.key)) {
            text.push_str(field.key);
            text.push_str(": ");
            text.push_str(&value);
            text.push('\n');
        }
    }
    text.push_str("---\n\n# ");
    text.push_str(&record.heading());
    text.push_str("\n\n");

    if let Some(body) = T::body_key().and_then(|key| map.get(key)).and_then(Value::as_str) {
        text.push_str(body);
    }
    text.push('\n');

    text
}

fn parse<T: Markdown>(text: &str) -> Option<T> {
    let document = Document::parse(text)?;
    let id = document.fields.get("id").map(|raw| unquote(raw))?;
    if RecordKind::from_id(&id) != Some(T::kind()) {
        debug!("record {id:?} does not have prefix {}", T::kind().prefix());
        return None;
    }

    decode(&document)
}

fn decode<T: Markdown>(document: &Document<'_>) -> Option<T> {
    if let Some(missing) = T::required()
        .iter()
        .find(|key| !document.fields.contains_key(**key))
    {
        debug!("record is missing required key {missing}");
        return None;
    }

    for key in document.fields.keys() {
        if !T::fields().iter().any(|field| field.key == *key) {
            debug!("ignoring unknown frontmatter key {key}");
        }
    }

    let mut map = Map::new();
    for field in T::fields() {
        match field.coerce(document.fields.get(field.key).copied()) {
            Ok(Some(value)) => {
                map.insert(field.key.to_string(), value);
            }
            Ok(None) => {}
            Err(MalformedField { key, raw }) => {
                warn!("record field {key} holds {raw:?}, expected a number");
                return None;
            }
        }
    }

    // Heading stands in for a title missing from frontmatter.
    if let (None, Some(heading)) = (document.fields.get("title"), document.heading) {
        if T::fields().iter().any(|field| field.key == "title") {
            map.insert("title".into(), Value::String(heading.to_string()));
        }
    }

    if let Some(key) = T::body_key() {
        map.insert(key.to_string(), Value::String(document.body.to_string()));
    }

    match serde_json::from_value::<T>(Value::Object(map.clone())) {
        Ok(record) => Some(record),
        Err(err) => {
            debug!("retrying decode with structured fields reset: {err}");
            for field in T::fields() {
                if matches!(field.kind, FieldKind::Json(_)) {
                    map.insert(field.key.to_string(), field.default_value());
                }
            }
            serde_json::from_value::<T>(Value::Object(map))
                .map_err(|err| debug!("record does not decode: {err}"))
                .ok()
        }
    }
}

/// Frontmatter split into raw values, plus heading and body.
#[derive(Debug)]
struct Document<'a> {
    fields: BTreeMap<&'a str, &'a str>,
    heading: Option<&'a str>,
    body: &'a str,
}

impl<'a> Document<'a> {
    fn parse(text: &'a str) -> Option<Self> {
        let captures = FRONTMATTER.captures(text)?;
        let whole = captures.get(0)?;
        let block = captures.get(1)?.as_str();

        let mut fields = BTreeMap::new();
        for line in block.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            if !key.is_empty() {
                fields.insert(key, value.trim());
            }
        }

        let mut rest = &text[whole.end()..];
        rest = strip_line_break(rest).unwrap_or(rest);

        let mut heading = None;
        if rest.starts_with('#') && !rest.starts_with("##") {
            let (line, after) = match rest.find('\n') {
                Some(pos) => (&rest[..pos], &rest[pos + 1..]),
                None => (rest, ""),
            };
            let title = line.trim_end_matches('\r').trim_start_matches('#');
            heading = Some(title.strip_prefix(' ').unwrap_or(title));
            rest = strip_line_break(after).unwrap_or(after);
        }

        let body = strip_trailing_line_break(rest);

        Some(Self {
            fields,
            heading,
            body,
        })
    }
}

fn strip_line_break(text: &str) -> Option<&str> {
    text.strip_prefix("\r\n").or_else(|| text.strip_prefix('\n'))
}

fn strip_trailing_line_break(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArtifactHeader, LinkType, LinkedArtifact, TestStep};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn requirement() -> Requirement {
        Requirement {
            header: ArtifactHeader {
                id: "REQ-001".into(),
                title: "Login: \"secure\"".into(),
                revision: "02".into(),
                status: "approved".into(),
                priority: "high".into(),
                date_created: 1_700_000_000_000,
                last_modified: 1_700_000_050_000,
                is_deleted: false,
                deleted_at: None,
                linked_artifacts: vec![LinkedArtifact {
                    target_id: "UC-001".into(),
                    link_type: LinkType::Satisfies,
                }],
            },
            rationale: "Accounts hold private data".into(),
            verification_method: "test".into(),
            author: "ana".into(),
            tags: vec!["auth".into()],
            text: "Users sign in with a password.\n\n## Notes\n\nNone".into(),
        }
    }

    #[test]
    fn requirement_layout() {
        let text = requirement().to_markdown();
        assert_eq!(
            text,
            indoc! {r#"
                ---
                id: "REQ-001"
                title: "Login: \"secure\""
                revision: "02"
                status: "approved"
                priority: "high"
                dateCreated: 1700000000000
                lastModified: 1700000050000
                isDeleted: false
                linkedArtifacts: [{"targetId":"UC-001","type":"satisfies"}]
                rationale: "Accounts hold private data"
                verificationMethod: "test"
                author: "ana"
                tags: ["auth"]
                ---

                # Login: "secure"

                Users sign in with a password.

                ## Notes

                None
            "#}
        );
    }

    #[test]
    fn requirement_decodes_from_own_encoding() {
        let requirement = requirement();
        let decoded = markdown_to_artifact(&requirement.to_markdown());
        assert_eq!(
            decoded,
            Some(Record::Artifact(Artifact::Requirement(requirement)))
        );
    }

    #[test]
    fn lenient_decode_fills_defaults() {
        let text = indoc! {r#"
            ---
            id: UC-003
            title: Checkout
            mainFlow: [not json
            color: "blue"
            ---

            # Checkout

            Pay for the cart.
        "#};

        let Some(Record::Artifact(Artifact::UseCase(use_case))) = markdown_to_artifact(text)
        else {
            panic!("use case did not decode");
        };
        assert_eq!(use_case.header.id, "UC-003");
        assert_eq!(use_case.header.title, "Checkout");
        assert_eq!(use_case.header.revision, "01");
        assert_eq!(use_case.header.status, "draft");
        assert_eq!(use_case.header.priority, "medium");
        assert!(use_case.main_flow.is_empty());
        assert_eq!(use_case.description, "Pay for the cart.");
    }

    #[test]
    fn wrong_shape_json_falls_back() {
        let text = indoc! {r#"
            ---
            id: "TC-001"
            title: "Smoke"
            steps: {"action":"run"}
            ---

            # Smoke

        "#};

        let test_case = markdown_to::<TestCase>(text);
        assert_eq!(test_case.map(|test_case| test_case.steps), Some(Vec::new()));
    }

    #[test]
    fn title_falls_back_to_heading() {
        let text = "---\nid: INFO-001\n---\n\n# Glossary\n\nTerms.\n";
        let info = markdown_to::<Information>(text);
        assert_eq!(info.map(|info| info.header.title), Some("Glossary".to_string()));
    }

    #[test]
    fn rejects_unusable_documents() {
        assert_eq!(markdown_to_artifact("# no frontmatter"), None);
        assert_eq!(markdown_to_artifact("---\ntitle: x\n---\n"), None);
        assert_eq!(markdown_to_artifact("---\nid: WIDGET-001\n---\n"), None);
        assert_eq!(markdown_to_artifact("---\nid: LINK-001\nsourceId: REQ-001\n---\n"), None);
        assert_eq!(markdown_to::<Risk>("---\nid: REQ-001\n---\n"), None);
    }

    #[test]
    fn crlf_documents_decode() {
        let text = "---\r\nid: \"RISK-002\"\r\ntitle: \"Outage\"\r\nimpact: \"high\"\r\n---\r\n\r\n# Outage\r\n\r\nServers fail.\r\n";
        let risk = markdown_to::<Risk>(text);
        assert_eq!(risk.as_ref().map(|risk| risk.impact.as_str()), Some("high"));
        assert_eq!(risk.map(|risk| risk.description), Some("Servers fail.".to_string()));
    }

    #[test]
    fn baseline_layout_keeps_commit_map() {
        let mut baseline = ProjectBaseline {
            id: "BL-001".into(),
            project_id: "PROJ-001".into(),
            name: "Release".into(),
            description: "First cut".into(),
            timestamp: 42,
            version: "01".into(),
            artifact_commits: BTreeMap::new(),
            added_artifacts: vec![],
            removed_artifacts: vec![],
        };
        baseline.artifact_commits.insert(
            "REQ-001".into(),
            crate::model::ArtifactCommit {
                commit_hash: "abc".into(),
                kind: ArtifactKind::Requirement,
            },
        );

        let text = baseline.to_markdown();
        assert!(text.contains(r#"artifactCommits: {"REQ-001":{"commitHash":"abc","type":"requirement"}}"#));
        assert_eq!(markdown_to::<ProjectBaseline>(&text), Some(baseline));
    }

    #[test]
    fn malformed_timestamp_is_reported() {
        let text = indoc! {r#"
            ---
            id: "REQ-004"
            title: "Audit log"
            dateCreated: 17000OO000000
            ---

            # Audit log

        "#};
        assert_eq!(markdown_to::<Requirement>(text), None);

        let text = "---\nid: \"TC-002\"\nlastExecuted: yesterday\n---\n\n# Run\n";
        assert_eq!(markdown_to_artifact(text), None);

        let text = "---\nid: \"TC-002\"\ndateCreated: 5\n---\n\n# Run\n";
        let test_case = markdown_to::<TestCase>(text);
        assert_eq!(test_case.map(|test_case| test_case.header.date_created), Some(5));
    }

    fn text() -> impl Strategy<Value = String> {
        "[ -~]{0,24}"
    }

    fn body() -> impl Strategy<Value = String> {
        "[ -~\n]{0,64}"
    }

    prop_compose! {
        fn header(prefix: &'static str)(
            number in 1u32..2000,
            title in text(),
            revision in "[0-9]{2,3}",
            status in text(),
            priority in text(),
            date_created in 0i64..4_000_000_000_000,
            last_modified in 0i64..4_000_000_000_000,
            is_deleted in any::<bool>(),
            deleted_at in proptest::option::of(0i64..4_000_000_000_000),
            links in proptest::collection::vec((text(), 0usize..12), 0..4),
        ) -> ArtifactHeader {
            ArtifactHeader {
                id: format!("{prefix}-{number:03}"),
                title,
                revision,
                status,
                priority,
                date_created,
                last_modified,
                is_deleted,
                deleted_at,
                linked_artifacts: links
                    .into_iter()
                    .map(|(target_id, kind)| LinkedArtifact {
                        target_id,
                        link_type: LinkType::ALL[kind],
                    })
                    .collect(),
            }
        }
    }

    prop_compose! {
        fn arb_requirement()(
            header in header("REQ"),
            rationale in text(),
            verification_method in text(),
            author in text(),
            tags in proptest::collection::vec(text(), 0..4),
            text in body(),
        ) -> Requirement {
            Requirement { header, rationale, verification_method, author, tags, text }
        }
    }

    prop_compose! {
        fn arb_test_case()(
            header in header("TC"),
            steps in proptest::collection::vec((text(), text()), 0..4),
            expected_result in text(),
            requirement_ids in proptest::collection::vec(text(), 0..3),
            last_executed in proptest::option::of(0i64..4_000_000_000_000),
            author in text(),
            description in body(),
        ) -> TestCase {
            TestCase {
                header,
                steps: steps
                    .into_iter()
                    .map(|(action, expected)| TestStep { action, expected })
                    .collect(),
                expected_result,
                requirement_ids,
                last_executed,
                author,
                description,
            }
        }
    }

    prop_compose! {
        fn arb_link()(
            source in 1u32..999,
            target in 1u32..999,
            kind in 0usize..12,
            project_ids in proptest::collection::vec("PROJ-[0-9]{3}", 0..3),
            date_created in 0i64..4_000_000_000_000,
        ) -> Link {
            Link {
                id: format!("LINK-{source:03}"),
                source_id: format!("REQ-{source:03}"),
                target_id: format!("TC-{target:03}"),
                link_type: LinkType::ALL[kind],
                project_ids,
                date_created,
                last_modified: date_created,
            }
        }
    }

    fn ids(prefix: &'static str) -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec((1u32..999).prop_map(move |n| format!("{prefix}-{n:03}")), 0..4)
    }

    prop_compose! {
        fn arb_use_case()(
            header in header("UC"),
            actor in text(),
            preconditions in text(),
            postconditions in text(),
            main_flow in proptest::collection::vec(text(), 0..4),
            alternative_flows in proptest::collection::vec(text(), 0..3),
            description in body(),
        ) -> UseCase {
            UseCase {
                header,
                actor,
                preconditions,
                postconditions,
                main_flow,
                alternative_flows,
                description,
            }
        }
    }

    prop_compose! {
        fn arb_information()(
            header in header("INFO"),
            info_type in text(),
            content in body(),
        ) -> Information {
            Information { header, info_type, content }
        }
    }

    prop_compose! {
        fn arb_risk()(
            header in header("RISK"),
            probability in text(),
            impact in text(),
            mitigation in text(),
            owner in text(),
            description in body(),
        ) -> Risk {
            Risk { header, probability, impact, mitigation, owner, description }
        }
    }

    prop_compose! {
        fn arb_saved_filter()(
            number in 1u32..999,
            name in text(),
            rules in proptest::collection::vec((text(), text(), any::<bool>()), 0..4),
            date_created in 0i64..4_000_000_000_000,
            last_modified in 0i64..4_000_000_000_000,
        ) -> SavedFilter {
            let filters = rules
                .into_iter()
                .map(|(field, value, negate)| {
                    serde_json::json!({ "field": field, "value": value, "negate": negate })
                })
                .collect();
            SavedFilter {
                id: format!("FILTER-{number:03}"),
                name,
                filters: Value::Array(filters),
                date_created,
                last_modified,
            }
        }
    }

    prop_compose! {
        fn arb_project()(
            number in 1u32..999,
            name in text(),
            description in body(),
            last_modified in 0i64..4_000_000_000_000,
            requirement_ids in ids("REQ"),
            use_case_ids in ids("UC"),
            test_case_ids in ids("TC"),
            information_ids in ids("INFO"),
            risk_ids in ids("RISK"),
        ) -> Project {
            Project {
                id: format!("PROJ-{number:03}"),
                name,
                description,
                last_modified,
                requirement_ids,
                use_case_ids,
                test_case_ids,
                information_ids,
                risk_ids,
            }
        }
    }

    prop_compose! {
        fn arb_baseline()(
            number in 1u32..999,
            project in 1u32..999,
            name in text(),
            description in text(),
            timestamp in 0i64..4_000_000_000_000,
            version in "[0-9]{2,3}",
            commits in proptest::collection::btree_map("REQ-[0-9]{3}", ("[0-9a-f]{40}", 0usize..5), 0..4),
            added_artifacts in ids("UC"),
            removed_artifacts in ids("RISK"),
        ) -> ProjectBaseline {
            ProjectBaseline {
                id: format!("BL-{number:03}"),
                project_id: format!("PROJ-{project:03}"),
                name,
                description,
                timestamp,
                version,
                artifact_commits: commits
                    .into_iter()
                    .map(|(id, (commit_hash, kind))| {
                        (id, crate::model::ArtifactCommit { commit_hash, kind: ArtifactKind::ALL[kind] })
                    })
                    .collect(),
                added_artifacts,
                removed_artifacts,
            }
        }
    }

    proptest! {
        #[test]
        fn requirements_survive_encoding(requirement in arb_requirement()) {
            let text = requirement.to_markdown();
            prop_assert_eq!(markdown_to::<Requirement>(&text), Some(requirement));
        }

        #[test]
        fn test_cases_survive_encoding(test_case in arb_test_case()) {
            let record = Record::Artifact(Artifact::TestCase(test_case));
            let text = artifact_to_markdown(&record);
            prop_assert_eq!(markdown_to_artifact(&text), Some(record));
        }

        #[test]
        fn links_survive_encoding(link in arb_link()) {
            let text = link.to_markdown();
            prop_assert_eq!(markdown_to::<Link>(&text), Some(link));
        }

        #[test]
        fn use_cases_survive_encoding(use_case in arb_use_case()) {
            let record = Record::Artifact(Artifact::UseCase(use_case));
            let text = artifact_to_markdown(&record);
            prop_assert_eq!(markdown_to_artifact(&text), Some(record));
        }

        #[test]
        fn information_survives_encoding(information in arb_information()) {
            let record = Record::Artifact(Artifact::Information(information));
            let text = artifact_to_markdown(&record);
            prop_assert_eq!(markdown_to_artifact(&text), Some(record));
        }

        #[test]
        fn risks_survive_encoding(risk in arb_risk()) {
            let record = Record::Artifact(Artifact::Risk(risk));
            let text = artifact_to_markdown(&record);
            prop_assert_eq!(markdown_to_artifact(&text), Some(record));
        }

        #[test]
        fn saved_filters_survive_encoding(filter in arb_saved_filter()) {
            let record = Record::SavedFilter(filter);
            let text = artifact_to_markdown(&record);
            prop_assert_eq!(markdown_to_artifact(&text), Some(record));
        }

        #[test]
        fn projects_survive_encoding(project in arb_project()) {
            let record = Record::Project(project);
            let text = artifact_to_markdown(&record);
            prop_assert_eq!(markdown_to_artifact(&text), Some(record));
        }

        #[test]
        fn baselines_survive_encoding(baseline in arb_baseline()) {
            let record = Record::Baseline(baseline);
            let text = artifact_to_markdown(&record);
            prop_assert_eq!(markdown_to_artifact(&text), Some(record));
        }

        #[test]
        fn arbitrary_text_never_panics(text in "[ -~\n]{0,128}") {
            let _ = markdown_to_artifact(&text);
        }
    }
}
