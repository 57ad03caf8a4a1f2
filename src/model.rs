// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Typed records persisted by reqtrace.
//!
//! Every record is stored as one Markdown file. Where that file lives, and
//! which prefix its id carries, is decided by its [`RecordKind`]:
//!
//! | record | prefix | location |
//! |---|---|---|
//! | requirement | `REQ` | `requirements/{id}.md` |
//! | use case | `UC` | `usecases/{id}.md` |
//! | test case | `TC` | `testcases/{id}.md` |
//! | information | `INFO` | `information/{id}.md` |
//! | risk | `RISK` | `risks/{id}.md` |
//! | link | `LINK` | `links/{id}.md` |
//! | saved filter | `FILTER` | `saved-filters/{id}.md` |
//! | project | `PROJ` | `project.md` |
//! | baseline | `BL` | `baselines/{id}.md` |

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Current time in milliseconds since the epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Kind of traceable artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Requirement,
    UseCase,
    TestCase,
    Information,
    Risk,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        Self::Requirement,
        Self::UseCase,
        Self::TestCase,
        Self::Information,
        Self::Risk,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Requirement => "REQ",
            Self::UseCase => "UC",
            Self::TestCase => "TC",
            Self::Information => "INFO",
            Self::Risk => "RISK",
        }
    }

    pub fn dir(&self) -> &'static str {
        match self {
            Self::Requirement => "requirements",
            Self::UseCase => "usecases",
            Self::TestCase => "testcases",
            Self::Information => "information",
            Self::Risk => "risks",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requirement => "requirement",
            Self::UseCase => "usecase",
            Self::TestCase => "testcase",
            Self::Information => "information",
            Self::Risk => "risk",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }
}

impl Display for ArtifactKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = UnknownKind;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let lower = name.to_ascii_lowercase().replace(['-', '_', ' '], "");
        Self::ALL
            .into_iter()
            .find(|kind| {
                kind.as_str() == lower
                    || kind.dir() == lower
                    || kind.prefix().eq_ignore_ascii_case(&lower)
            })
            .ok_or_else(|| UnknownKind(name.to_string()))
    }
}

/// Name does not denote any artifact kind.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown artifact kind {0:?}")]
pub struct UnknownKind(pub String);

/// Kind of any persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Artifact(ArtifactKind),
    Link,
    SavedFilter,
    Project,
    Baseline,
}

impl RecordKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Artifact(kind) => kind.prefix(),
            Self::Link => "LINK",
            Self::SavedFilter => "FILTER",
            Self::Project => "PROJ",
            Self::Baseline => "BL",
        }
    }

    /// Directory holding records of this kind, relative to repository root.
    pub fn dir(&self) -> &'static str {
        match self {
            Self::Artifact(kind) => kind.dir(),
            Self::Link => "links",
            Self::SavedFilter => "saved-filters",
            Self::Project => "",
            Self::Baseline => "baselines",
        }
    }

    /// Name of counter file under `counters/`.
    pub fn counter(&self) -> &'static str {
        match self {
            Self::Artifact(kind) => kind.as_str(),
            Self::Link => "link",
            Self::SavedFilter => "filter",
            Self::Project => "project",
            Self::Baseline => "baseline",
        }
    }

    /// Path of record file relative to repository root.
    pub fn path(&self, id: &str) -> String {
        match self {
            Self::Project => "project.md".to_string(),
            kind => format!("{}/{id}.md", kind.dir()),
        }
    }

    /// Kind denoted by the prefix of `id`.
    pub fn from_id(id: &str) -> Option<Self> {
        let (prefix, _) = id.rsplit_once('-')?;
        match prefix {
            "LINK" => Some(Self::Link),
            "FILTER" => Some(Self::SavedFilter),
            "PROJ" => Some(Self::Project),
            "BL" => Some(Self::Baseline),
            prefix => ArtifactKind::from_prefix(prefix).map(Self::Artifact),
        }
    }
}

impl From<ArtifactKind> for RecordKind {
    fn from(kind: ArtifactKind) -> Self {
        Self::Artifact(kind)
    }
}

/// Relationship kind of a link.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Satisfies,
    Verifies,
    DependsOn,
    #[default]
    RelatedTo,
    Parent,
    Child,
    DerivedFrom,
    ConflictsWith,
    Duplicates,
    Refines,
    Constrains,
    Requires,
}

impl LinkType {
    pub const ALL: [LinkType; 12] = [
        Self::Satisfies,
        Self::Verifies,
        Self::DependsOn,
        Self::RelatedTo,
        Self::Parent,
        Self::Child,
        Self::DerivedFrom,
        Self::ConflictsWith,
        Self::Duplicates,
        Self::Refines,
        Self::Constrains,
        Self::Requires,
    ];
}

impl FromStr for LinkType {
    type Err = serde_json::Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(name.replace('-', "_")))
    }
}

impl Display for LinkType {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        fmt.write_str(&name)
    }
}

/// Outgoing relationship recorded on an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedArtifact {
    pub target_id: String,
    #[serde(rename = "type")]
    pub link_type: LinkType,
}

/// Fields shared by every artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactHeader {
    pub id: String,
    pub title: String,
    pub revision: String,
    pub status: String,
    pub priority: String,
    pub date_created: i64,
    pub last_modified: i64,
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
    pub linked_artifacts: Vec<LinkedArtifact>,
}

impl ArtifactHeader {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            title: title.into(),
            revision: crate::ids::INITIAL_REVISION.to_string(),
            status: "draft".to_string(),
            priority: "medium".to_string(),
            date_created: now,
            last_modified: now,
            is_deleted: false,
            deleted_at: None,
            linked_artifacts: Vec::new(),
        }
    }
}

impl Default for ArtifactHeader {
    fn default() -> Self {
        Self::new("", "")
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    #[serde(flatten)]
    pub header: ArtifactHeader,
    pub rationale: String,
    pub verification_method: String,
    pub author: String,
    pub tags: Vec<String>,
    pub text: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseCase {
    #[serde(flatten)]
    pub header: ArtifactHeader,
    pub actor: String,
    pub preconditions: String,
    pub postconditions: String,
    pub main_flow: Vec<String>,
    pub alternative_flows: Vec<String>,
    pub description: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStep {
    pub action: String,
    pub expected: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(flatten)]
    pub header: ArtifactHeader,
    pub steps: Vec<TestStep>,
    pub expected_result: String,
    pub requirement_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed: Option<i64>,
    pub author: String,
    pub description: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Information {
    #[serde(flatten)]
    pub header: ArtifactHeader,
    pub info_type: String,
    pub content: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Risk {
    #[serde(flatten)]
    pub header: ArtifactHeader,
    pub probability: String,
    pub impact: String,
    pub mitigation: String,
    pub owner: String,
    pub description: String,
}

/// Any traceable artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Requirement(Requirement),
    UseCase(UseCase),
    TestCase(TestCase),
    Information(Information),
    Risk(Risk),
}

impl Artifact {
    /// Blank artifact of `kind`.
    pub fn new(kind: ArtifactKind, id: impl Into<String>, title: impl Into<String>) -> Self {
        let header = ArtifactHeader::new(id, title);
        match kind {
            ArtifactKind::Requirement => Self::Requirement(Requirement {
                header,
                ..Default::default()
            }),
            ArtifactKind::UseCase => Self::UseCase(UseCase {
                header,
                ..Default::default()
            }),
            ArtifactKind::TestCase => Self::TestCase(TestCase {
                header,
                ..Default::default()
            }),
            ArtifactKind::Information => Self::Information(Information {
                header,
                ..Default::default()
            }),
            ArtifactKind::Risk => Self::Risk(Risk {
                header,
                ..Default::default()
            }),
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Requirement(_) => ArtifactKind::Requirement,
            Self::UseCase(_) => ArtifactKind::UseCase,
            Self::TestCase(_) => ArtifactKind::TestCase,
            Self::Information(_) => ArtifactKind::Information,
            Self::Risk(_) => ArtifactKind::Risk,
        }
    }

    pub fn header(&self) -> &ArtifactHeader {
        match self {
            Self::Requirement(artifact) => &artifact.header,
            Self::UseCase(artifact) => &artifact.header,
            Self::TestCase(artifact) => &artifact.header,
            Self::Information(artifact) => &artifact.header,
            Self::Risk(artifact) => &artifact.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut ArtifactHeader {
        match self {
            Self::Requirement(artifact) => &mut artifact.header,
            Self::UseCase(artifact) => &mut artifact.header,
            Self::TestCase(artifact) => &mut artifact.header,
            Self::Information(artifact) => &mut artifact.header,
            Self::Risk(artifact) => &mut artifact.header,
        }
    }

    pub fn id(&self) -> &str {
        &self.header().id
    }

    /// Free text body of the artifact.
    pub fn body(&self) -> &str {
        match self {
            Self::Requirement(artifact) => &artifact.text,
            Self::UseCase(artifact) => &artifact.description,
            Self::TestCase(artifact) => &artifact.description,
            Self::Information(artifact) => &artifact.content,
            Self::Risk(artifact) => &artifact.description,
        }
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        let body = body.into();
        match self {
            Self::Requirement(artifact) => artifact.text = body,
            Self::UseCase(artifact) => artifact.description = body,
            Self::TestCase(artifact) => artifact.description = body,
            Self::Information(artifact) => artifact.content = body,
            Self::Risk(artifact) => artifact.description = body,
        }
    }
}

/// Stored relationship between two artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub link_type: LinkType,

    /// Projects the link is visible in, empty for every project.
    pub project_ids: Vec<String>,
    pub date_created: i64,
    pub last_modified: i64,
}

impl Link {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        link_type: LinkType,
    ) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            link_type,
            project_ids: Vec::new(),
            date_created: now,
            last_modified: now,
        }
    }

    /// Is link visible when viewing `project`?
    ///
    /// Viewing the global library (`None`) shows every link.
    pub fn visible_in(&self, project: Option<&str>) -> bool {
        match project {
            None => true,
            Some(project) => {
                self.project_ids.is_empty() || self.project_ids.iter().any(|id| id == project)
            }
        }
    }

    /// Unordered endpoint pair, so both directions share one matrix slot.
    pub fn slot(&self) -> (&str, &str) {
        if self.source_id <= self.target_id {
            (&self.source_id, &self.target_id)
        } else {
            (&self.target_id, &self.source_id)
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source_id == id || self.target_id == id
    }
}

/// Named set of search criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedFilter {
    pub id: String,
    pub name: String,

    /// Criteria array, opaque to the storage layer.
    pub filters: serde_json::Value,
    pub date_created: i64,
    pub last_modified: i64,
}

impl SavedFilter {
    pub fn new(id: impl Into<String>, name: impl Into<String>, filters: serde_json::Value) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            name: name.into(),
            filters,
            date_created: now,
            last_modified: now,
        }
    }
}

/// Project and its artifact memberships.
///
/// Membership is by reference: artifacts live in the global library, and a
/// project only lists their ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub last_modified: i64,
    pub requirement_ids: Vec<String>,
    pub use_case_ids: Vec<String>,
    pub test_case_ids: Vec<String>,
    pub information_ids: Vec<String>,
    pub risk_ids: Vec<String>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            last_modified: now_ms(),
            requirement_ids: Vec::new(),
            use_case_ids: Vec::new(),
            test_case_ids: Vec::new(),
            information_ids: Vec::new(),
            risk_ids: Vec::new(),
        }
    }

    pub fn members(&self, kind: ArtifactKind) -> &[String] {
        match kind {
            ArtifactKind::Requirement => &self.requirement_ids,
            ArtifactKind::UseCase => &self.use_case_ids,
            ArtifactKind::TestCase => &self.test_case_ids,
            ArtifactKind::Information => &self.information_ids,
            ArtifactKind::Risk => &self.risk_ids,
        }
    }

    fn members_mut(&mut self, kind: ArtifactKind) -> &mut Vec<String> {
        match kind {
            ArtifactKind::Requirement => &mut self.requirement_ids,
            ArtifactKind::UseCase => &mut self.use_case_ids,
            ArtifactKind::TestCase => &mut self.test_case_ids,
            ArtifactKind::Information => &mut self.information_ids,
            ArtifactKind::Risk => &mut self.risk_ids,
        }
    }

    /// Add member, returning whether it was new.
    pub fn add_member(&mut self, kind: ArtifactKind, id: &str) -> bool {
        let members = self.members_mut(kind);
        if members.iter().any(|member| member == id) {
            return false;
        }
        members.push(id.to_string());
        true
    }

    /// Remove member from every list, returning whether it was present.
    pub fn remove_member(&mut self, id: &str) -> bool {
        let mut removed = false;
        for kind in ArtifactKind::ALL {
            let members = self.members_mut(kind);
            let before = members.len();
            members.retain(|member| member != id);
            removed |= members.len() != before;
        }
        removed
    }

    /// Every member with its kind, in kind order.
    pub fn all_members(&self) -> Vec<(ArtifactKind, String)> {
        ArtifactKind::ALL
            .into_iter()
            .flat_map(|kind| self.members(kind).iter().map(move |id| (kind, id.clone())))
            .collect()
    }
}

/// Commit an artifact was at when a baseline was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactCommit {
    pub commit_hash: String,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
}

/// Versioned snapshot of a project's artifact to commit mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBaseline {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub description: String,
    pub timestamp: i64,
    pub version: String,
    pub artifact_commits: BTreeMap<String, ArtifactCommit>,
    pub added_artifacts: Vec<String>,
    pub removed_artifacts: Vec<String>,
}

impl ProjectBaseline {
    /// Numeric value of version, zero when unparseable.
    pub fn version_number(&self) -> u32 {
        self.version.trim().parse().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_kind_from_id_prefix() {
        assert_eq!(
            RecordKind::from_id("REQ-007"),
            Some(RecordKind::Artifact(ArtifactKind::Requirement))
        );
        assert_eq!(RecordKind::from_id("INFO-010"), Some(RecordKind::Artifact(ArtifactKind::Information)));
        assert_eq!(RecordKind::from_id("LINK-001"), Some(RecordKind::Link));
        assert_eq!(RecordKind::from_id("BL-002"), Some(RecordKind::Baseline));
        assert_eq!(RecordKind::from_id("NOPE-001"), None);
        assert_eq!(RecordKind::from_id("REQ"), None);
        assert_eq!(RecordKind::Project.path("PROJ-001"), "project.md");
        assert_eq!(RecordKind::SavedFilter.path("FILTER-001"), "saved-filters/FILTER-001.md");
    }

    #[test]
    fn artifact_kind_names() -> anyhow::Result<()> {
        assert_eq!("requirement".parse::<ArtifactKind>()?, ArtifactKind::Requirement);
        assert_eq!("use-case".parse::<ArtifactKind>()?, ArtifactKind::UseCase);
        assert_eq!("tc".parse::<ArtifactKind>()?, ArtifactKind::TestCase);
        assert_eq!("risks".parse::<ArtifactKind>()?, ArtifactKind::Risk);
        assert!("widget".parse::<ArtifactKind>().is_err());

        Ok(())
    }

    #[test]
    fn link_scope_and_slot() {
        let mut link = Link::new("LINK-001", "REQ-002", "REQ-001", LinkType::DependsOn);
        assert!(link.visible_in(Some("PROJ-001")));
        assert!(link.visible_in(Some("PROJ-002")));

        link.project_ids = vec!["PROJ-001".into()];
        assert!(link.visible_in(Some("PROJ-001")));
        assert!(!link.visible_in(Some("PROJ-002")));
        assert!(link.visible_in(None));

        let reverse = Link::new("LINK-002", "REQ-001", "REQ-002", LinkType::DependsOn);
        assert_eq!(link.slot(), reverse.slot());
        assert_eq!(link.link_type.to_string(), "depends_on");
    }

    #[test]
    fn project_membership() {
        let mut project = Project::new("PROJ-001", "Alpha", "");
        assert!(project.add_member(ArtifactKind::Requirement, "REQ-001"));
        assert!(!project.add_member(ArtifactKind::Requirement, "REQ-001"));
        assert!(project.add_member(ArtifactKind::Risk, "RISK-001"));

        assert_eq!(
            project.all_members(),
            vec![
                (ArtifactKind::Requirement, "REQ-001".to_string()),
                (ArtifactKind::Risk, "RISK-001".to_string()),
            ]
        );
        assert!(project.remove_member("REQ-001"));
        assert!(!project.remove_member("REQ-001"));
    }
}
