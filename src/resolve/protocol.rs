//! Remote schedule-service protocol: request routes and document shapes.
//!
//! The transport (HTTP, auth, retry, caching) is the query engine's
//! responsibility; this module only builds requests and decodes the
//! structured key/value documents that come back. Parsing is per-item
//! tolerant: a malformed item is skipped, the page continues.

use glam::DVec3;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::core::{
    Appearance, Generation, GrowthDirection, GrowthSimulation, PathKeyframe, ProfileAction, Rgb,
    TimeRange,
};
use crate::util::{ElementId, Error, Result, RigidTransform, TimePoint};

/// Items requested per page.
pub const PAGE_SIZE: usize = 100;

/// Maximum element ids per bindings-query request; capped for server
/// performance.
pub const ELEMENT_BATCH_MAX: usize = 100;

/// HTTP method of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One unit of work handed to the query engine.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    /// Route path including any non-pagination query parameters.
    pub path: String,
    /// JSON body for POST queries.
    pub body: Option<serde_json::Value>,
    pub page_size: usize,
    pub page_token: Option<String>,
}

impl Request {
    fn get(path: String) -> Self {
        Self {
            method: Method::Get,
            path,
            body: None,
            page_size: PAGE_SIZE,
            page_token: None,
        }
    }

    /// Continue this request at the given page.
    pub fn with_page_token(mut self, token: impl Into<String>) -> Self {
        self.page_token = Some(token.into());
        self
    }

    /// List schedules visible in an iTwin. The parameter name depends on
    /// the service generation.
    pub fn schedules(generation: Generation, itwin_id: &str) -> Self {
        Self::get(format!(
            "/schedules?{}={}",
            generation.context_param(),
            itwin_id
        ))
    }

    /// List all tasks of a schedule.
    pub fn tasks(schedule_id: &str) -> Self {
        Self::get(format!("/schedules/{schedule_id}/tasks"))
    }

    /// Fetch one task's details.
    pub fn task(schedule_id: &str, task_id: &str) -> Self {
        Self::get(format!("/schedules/{schedule_id}/tasks/{task_id}"))
    }

    /// Fetch one appearance profile's details.
    pub fn appearance_profile(schedule_id: &str, profile_id: &str) -> Self {
        Self::get(format!(
            "/schedules/{schedule_id}/appearanceProfiles/{profile_id}"
        ))
    }

    /// Query animation bindings, optionally filtered.
    pub fn bindings_query(schedule_id: &str, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: format!("/schedules/{schedule_id}/animationBindings/query"),
            body: Some(body),
            page_size: PAGE_SIZE,
            page_token: None,
        }
    }

    /// Fetch one static 3D transform.
    pub fn transform3d(schedule_id: &str, transform_id: &str) -> Self {
        Self::get(format!(
            "/schedules/{schedule_id}/animation3dTransforms/{transform_id}"
        ))
    }

    /// Fetch one path assignment.
    pub fn path_assignment(schedule_id: &str, assignment_id: &str) -> Self {
        Self::get(format!(
            "/schedules/{schedule_id}/animation3dPathAssignments/{assignment_id}"
        ))
    }

    /// Fetch a path's keyframes (paginated).
    pub fn path_keyframes(schedule_id: &str, path_id: &str) -> Self {
        Self::get(format!(
            "/schedules/{schedule_id}/animation3dPaths/{path_id}/keyframes"
        ))
    }
}

/// The bindings-query body filters.
#[derive(Clone, Debug, Default)]
pub struct BindingsFilter {
    /// Restrict to these elements; empty means no element filter.
    pub element_ids: Vec<ElementId>,
    pub from_time: Option<TimePoint>,
    pub until_time: Option<TimePoint>,
    /// Restrict to these tasks; empty means no task filter.
    pub task_ids: Vec<String>,
}

impl BindingsFilter {
    /// Time-window filter.
    pub fn time_window(from: Option<TimePoint>, until: Option<TimePoint>) -> Self {
        Self {
            from_time: from,
            until_time: until,
            ..Default::default()
        }
    }

    /// Build the POST body for one slice of the element id set.
    ///
    /// Legacy-generation schedules address animated entities through a
    /// per-element user field, passed along with the query.
    pub fn to_body(&self, elements: &[ElementId], user_field_id: Option<&str>) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        if let Some(field) = user_field_id {
            body.insert("animatedEntityUserFieldId".into(), field.into());
        }
        if !elements.is_empty() {
            let ids: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
            body.insert("animatedEntityIds".into(), ids.into());
        }
        if let Some(t) = self.from_time {
            body.insert("startTime".into(), format_timestamp(t).into());
        }
        if let Some(t) = self.until_time {
            body.insert("endTime".into(), format_timestamp(t).into());
        }
        if !self.task_ids.is_empty() {
            body.insert("taskIds".into(), self.task_ids.clone().into());
        }
        serde_json::Value::Object(body)
    }
}

/// Parse an RFC 3339 timestamp into absolute seconds.
pub fn parse_timestamp(s: &str) -> Result<TimePoint> {
    let parsed = OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|_| Error::InvalidTimestamp(s.to_string()))?;
    Ok(parsed.unix_timestamp_nanos() as f64 / 1e9)
}

/// Format absolute seconds as an RFC 3339 timestamp.
pub fn format_timestamp(t: TimePoint) -> String {
    OffsetDateTime::from_unix_timestamp_nanos((t * 1e9) as i128)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string())
}

/// A paginated reply.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl<T: serde::de::DeserializeOwned> Page<T> {
    /// Decode a page document.
    pub fn from_document(doc: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(doc)?)
    }
}

/// One schedule in the schedules listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub i_model_id: Option<String>,
    #[serde(default)]
    pub animated_entity_user_field_id: Option<String>,
}

/// One task item.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub planned_start: Option<String>,
    #[serde(default)]
    pub planned_finish: Option<String>,
}

impl TaskItem {
    /// The planned `[start, end)` range; both dates are required.
    pub fn time_range(&self) -> Result<TimeRange> {
        let start = self.planned_start.as_deref().ok_or(Error::MissingField {
            field: "plannedStart",
            context: "task item",
        })?;
        let finish = self.planned_finish.as_deref().ok_or(Error::MissingField {
            field: "plannedFinish",
            context: "task item",
        })?;
        Ok(TimeRange::new(parse_timestamp(start)?, parse_timestamp(finish)?))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorDoc {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthDoc {
    pub direction: String,
    #[serde(default)]
    pub percent_complete: Option<bool>,
    #[serde(default)]
    pub invert: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppearanceDoc {
    #[serde(default)]
    pub visible: Option<bool>,
    #[serde(default)]
    pub color: Option<ColorDoc>,
    #[serde(default)]
    pub transparency: Option<f64>,
    #[serde(default)]
    pub growth_simulation: Option<GrowthDoc>,
}

impl AppearanceDoc {
    /// Decode into the core appearance state.
    pub fn to_appearance(&self) -> Appearance {
        Appearance {
            visible: self.visible,
            color: self.color.as_ref().map(|c| Rgb::new(c.red, c.green, c.blue)),
            transparency: self.transparency,
        }
    }

    /// Decode the growth-simulation parameters, if present and valid.
    pub fn growth(&self) -> Option<GrowthSimulation> {
        let doc = self.growth_simulation.as_ref()?;
        let direction = GrowthDirection::parse(&doc.direction)?;
        Some(GrowthSimulation {
            direction,
            percent_complete: doc.percent_complete.unwrap_or(false),
            invert: doc.invert.unwrap_or(false),
        })
    }
}

/// One appearance-profile item.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileItem {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub start_appearance: Option<AppearanceDoc>,
    #[serde(default)]
    pub active_appearance: Option<AppearanceDoc>,
    #[serde(default)]
    pub end_appearance: Option<AppearanceDoc>,
}

impl ProfileItem {
    /// The profile action; first-letter case-insensitive match.
    pub fn parsed_action(&self) -> Result<ProfileAction> {
        ProfileAction::parse(&self.action).ok_or_else(|| {
            Error::invalid("action", "appearance profile", self.action.clone())
        })
    }
}

/// One animation-binding item.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingItem {
    #[serde(default)]
    pub animated_entity_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub appearance_profile_id: Option<String>,
    /// Present when the item binds a whole resource group rather than a
    /// single resource.
    #[serde(default)]
    pub resource_group_id: Option<String>,
    #[serde(default)]
    pub transform_id: Option<String>,
    #[serde(default)]
    pub path_assignment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Vec3Doc {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3Doc {
    pub fn to_dvec3(&self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }
}

/// Axis-angle rotation; angle in degrees.
#[derive(Debug, Deserialize)]
pub struct RotationDoc {
    pub angle: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One path assignment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathAssignmentDoc {
    pub path_id: String,
    #[serde(default)]
    pub alignment: Option<String>,
    #[serde(default)]
    pub center: Option<Vec3Doc>,
    #[serde(default)]
    pub reverse_direction: Option<bool>,
}

/// One path keyframe item.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathKeyframeDoc {
    pub time: f64,
    pub position: Vec3Doc,
    #[serde(default)]
    pub rotation: Option<RotationDoc>,
}

impl PathKeyframeDoc {
    /// Decode into a path keyframe; degrees become radians, a degenerate
    /// rotation axis falls back to identity.
    pub fn to_keyframe(&self) -> PathKeyframe {
        let rotation = match &self.rotation {
            Some(r) => {
                let axis = DVec3::new(r.x, r.y, r.z);
                if axis.length_squared() > 1e-8 {
                    glam::DQuat::from_axis_angle(axis.normalize(), r.angle.to_radians())
                } else {
                    glam::DQuat::IDENTITY
                }
            }
            None => glam::DQuat::IDENTITY,
        };
        PathKeyframe {
            rel_time: self.time,
            transform: RigidTransform::new(self.position.to_dvec3(), rotation),
        }
    }
}

/// Decode a static 3D transform document: 16 row-major numbers.
pub fn parse_transform3d(doc: &serde_json::Value) -> Result<RigidTransform> {
    let numbers: Vec<f64> = serde_json::from_value(doc.clone())?;
    let values: [f64; 16] = numbers.try_into().map_err(|v: Vec<f64>| {
        Error::invalid("transform", "3d transform", format!("expected 16 numbers, got {}", v.len()))
    })?;
    Ok(RigidTransform::from_row_major(&values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_timestamp() {
        let t = parse_timestamp("1970-01-01T00:01:00Z").unwrap();
        assert_eq!(t, 60.0);
        assert!(parse_timestamp("not a date").is_err());
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let t = parse_timestamp("2024-03-01T12:00:00Z").unwrap();
        let s = format_timestamp(t);
        assert_eq!(parse_timestamp(&s).unwrap(), t);
    }

    #[test]
    fn test_page_decode() {
        let doc = json!({
            "items": [{"id": "T1"}, {"id": "T2"}],
            "nextPageToken": "p2"
        });
        let page: Page<TaskItem> = Page::from_document(doc).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_page_token.as_deref(), Some("p2"));

        let last: Page<TaskItem> = Page::from_document(json!({"items": []})).unwrap();
        assert!(last.next_page_token.is_none());
    }

    #[test]
    fn test_task_item_range() {
        let item: TaskItem = serde_json::from_value(json!({
            "id": "T1",
            "name": "Pour",
            "plannedStart": "1970-01-01T00:00:10Z",
            "plannedFinish": "1970-01-01T00:00:20Z"
        }))
        .unwrap();
        let range = item.time_range().unwrap();
        assert_eq!(range.start, 10.0);
        assert_eq!(range.end, 20.0);

        let missing: TaskItem = serde_json::from_value(json!({"id": "T2"})).unwrap();
        assert!(missing.time_range().is_err());
    }

    #[test]
    fn test_profile_decode() {
        let item: ProfileItem = serde_json::from_value(json!({
            "id": "A1",
            "action": "install",
            "activeAppearance": {
                "color": {"red": 0, "green": 255, "blue": 0},
                "transparency": 30.0,
                "growthSimulation": {"direction": "bottomUp", "percentComplete": true}
            }
        }))
        .unwrap();
        assert_eq!(item.parsed_action().unwrap(), ProfileAction::Install);
        let active = item.active_appearance.as_ref().unwrap();
        assert_eq!(active.to_appearance().color, Some(Rgb::new(0, 255, 0)));
        let growth = active.growth().unwrap();
        assert!(growth.percent_complete);
        assert!(!growth.invert);
    }

    #[test]
    fn test_filter_body() {
        let filter = BindingsFilter::time_window(Some(0.0), Some(3600.0));
        let body = filter.to_body(&[ElementId(0x20), ElementId(0x21)], Some("uf-1"));
        assert_eq!(body["animatedEntityUserFieldId"], "uf-1");
        assert_eq!(body["animatedEntityIds"][0], "0x20");
        assert_eq!(body["animatedEntityIds"][1], "0x21");
        assert_eq!(body["startTime"], "1970-01-01T00:00:00Z");
        assert!(body.get("taskIds").is_none());

        let empty = BindingsFilter::default().to_body(&[], None);
        assert_eq!(empty, json!({}));
    }

    #[test]
    fn test_transform3d_decode() {
        let mut vals = vec![0.0; 16];
        vals[0] = 1.0;
        vals[5] = 1.0;
        vals[10] = 1.0;
        vals[15] = 1.0;
        vals[12] = 7.0;
        let t = parse_transform3d(&json!(vals)).unwrap();
        assert_eq!(t.position.x, 7.0);

        assert!(parse_transform3d(&json!([1.0, 2.0])).is_err());
    }

    #[test]
    fn test_path_keyframe_rotation() {
        let doc: PathKeyframeDoc = serde_json::from_value(json!({
            "time": 0.5,
            "position": {"x": 1.0, "y": 2.0, "z": 3.0},
            "rotation": {"angle": 90.0, "x": 0.0, "y": 0.0, "z": 1.0}
        }))
        .unwrap();
        let kf = doc.to_keyframe();
        assert_eq!(kf.rel_time, 0.5);
        let rotated = kf.transform.rotation * DVec3::X;
        assert!((rotated.y - 1.0).abs() < 1e-9);

        let no_axis: PathKeyframeDoc = serde_json::from_value(json!({
            "time": 0.0,
            "position": {"x": 0.0, "y": 0.0, "z": 0.0},
            "rotation": {"angle": 45.0, "x": 0.0, "y": 0.0, "z": 0.0}
        }))
        .unwrap();
        assert_eq!(no_axis.to_keyframe().transform.rotation, glam::DQuat::IDENTITY);
    }
}
