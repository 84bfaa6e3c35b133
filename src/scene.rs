use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authored scene as produced by the editor: a forest of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Scene {
    #[serde(default)]
    pub objects: Vec<SceneObject>,
}

impl Scene {
    /// Parses the scene XML produced by the authoring tools.
    ///
    /// Objects nest: an `<object>` element inside another becomes its child.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        let mut objects = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("object")) {
            objects.push(parse_object(&node)?);
        }
        let mut scene = Self { objects };
        scene.assign_missing_ids();
        Ok(scene)
    }

    /// Parses the JSON export of the authoring tools.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut scene: Scene = serde_json::from_str(json).context("invalid scene JSON")?;
        scene.assign_missing_ids();
        Ok(scene)
    }

    /// Total number of authored objects, descendants included.
    pub fn object_count(&self) -> usize {
        fn count(objects: &[SceneObject]) -> usize {
            objects.iter().map(|o| 1 + count(&o.children)).sum()
        }
        count(&self.objects)
    }

    fn assign_missing_ids(&mut self) {
        fn assign(objects: &mut [SceneObject]) {
            for object in objects {
                if object.id.trim().is_empty() {
                    object.id = Uuid::new_v4().to_string();
                }
                assign(&mut object.children);
            }
        }
        assign(&mut self.objects);
    }
}

/// Scene object as described by the authoring tools.
///
/// Transforms are world-space; `rotation` holds XYZ Euler angles in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneObject {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: ObjectKind,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physics: Option<PhysicsDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<ConstraintDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motor: Option<MotorDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waypoints: Option<WaypointDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptDescription>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SceneObject>,
}

impl SceneObject {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ObjectKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: default_scale(),
            physics: None,
            constraint: None,
            motor: None,
            controller: None,
            waypoints: None,
            script: None,
            properties: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_child(mut self, child: SceneObject) -> Self {
        self.children.push(child);
        self
    }

    /// Tag used by `$first:<type>` lookups.
    pub fn type_tag(&self) -> &'static str {
        self.kind.type_tag()
    }

    /// Copy of this description under a new id, without children.
    ///
    /// Runtime nodes own their children separately, so the copy carries only
    /// the object's own fields. Every field is owned data, so the copy never
    /// shares mutable state with the original.
    pub fn duplicate(&self, id: impl Into<String>) -> SceneObject {
        let kind = match &self.kind {
            ObjectKind::Mesh(mesh) => ObjectKind::Mesh(MeshDescription {
                mesh: mesh.mesh.clone(),
                color: mesh.color,
            }),
            ObjectKind::Light(light) => ObjectKind::Light(LightDescription { ..*light }),
            ObjectKind::Camera(camera) => ObjectKind::Camera(CameraDescription { ..*camera }),
            ObjectKind::Group => ObjectKind::Group,
            ObjectKind::Storage => ObjectKind::Storage,
        };
        SceneObject {
            id: id.into(),
            name: self.name.clone(),
            kind,
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
            physics: self.physics.clone(),
            constraint: self.constraint.clone(),
            motor: self.motor.clone(),
            controller: self.controller.clone(),
            waypoints: self.waypoints.clone(),
            script: self.script.clone(),
            properties: self.properties.clone(),
            children: Vec::new(),
        }
    }
}

/// Authored object variant; its tag becomes the node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ObjectKind {
    Mesh(MeshDescription),
    Light(LightDescription),
    Camera(CameraDescription),
    Group,
    /// Holding container; everything below it is kept but inactive.
    Storage,
}

impl ObjectKind {
    pub fn type_tag(&self) -> &'static str {
        match self {
            ObjectKind::Mesh(_) => "mesh",
            ObjectKind::Light(_) => "light",
            ObjectKind::Camera(_) => "camera",
            ObjectKind::Group => "group",
            ObjectKind::Storage => "storage",
        }
    }

    fn from_tag(tag: &str) -> Result<Self> {
        Ok(match tag {
            "mesh" => ObjectKind::Mesh(MeshDescription::default()),
            "light" => ObjectKind::Light(LightDescription::default()),
            "camera" => ObjectKind::Camera(CameraDescription::default()),
            "group" => ObjectKind::Group,
            "storage" => ObjectKind::Storage,
            other => return Err(anyhow!("unknown object type \"{other}\"")),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<String>,
    #[serde(default = "default_color")]
    pub color: Vec3,
}

impl Default for MeshDescription {
    fn default() -> Self {
        Self {
            mesh: None,
            color: default_color(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightDescription {
    #[serde(default = "default_color")]
    pub color: Vec3,
    #[serde(default = "default_intensity")]
    pub intensity: f32,
}

impl Default for LightDescription {
    fn default() -> Self {
        Self {
            color: default_color(),
            intensity: default_intensity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraDescription {
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
}

impl Default for CameraDescription {
    fn default() -> Self {
        Self {
            fov: default_fov(),
            near: default_near(),
            far: default_far(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BodyKind {
    #[default]
    Dynamic,
    Fixed,
    Kinematic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ShapeDescription {
    Cuboid {
        #[serde(rename = "halfExtents")]
        half_extents: Vec3,
    },
    Ball {
        radius: f32,
    },
}

impl Default for ShapeDescription {
    fn default() -> Self {
        ShapeDescription::Cuboid {
            half_extents: Vec3::splat(0.5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicsDescription {
    #[serde(default)]
    pub body: BodyKind,
    #[serde(default)]
    pub shape: ShapeDescription,
    #[serde(default = "default_mass")]
    pub mass: f32,
}

impl Default for PhysicsDescription {
    fn default() -> Self {
        Self {
            body: BodyKind::default(),
            shape: ShapeDescription::default(),
            mass: default_mass(),
        }
    }
}

/// Fixed joint between two physics-enabled objects. `body_a` defaults to the
/// owning object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_a: Option<String>,
    pub body_b: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MotorAxis {
    #[default]
    Auto,
    X,
    Y,
    Z,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriveMode {
    #[default]
    Velocity,
    Position,
}

/// Revolute joint between the owning object and a wheel object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotorDescription {
    pub wheel: String,
    #[serde(default)]
    pub axis: MotorAxis,
    #[serde(default)]
    pub mode: DriveMode,
    #[serde(default)]
    pub target_velocity: f32,
    #[serde(default = "default_motor_factor")]
    pub velocity_factor: f32,
    /// Target angle in degrees.
    #[serde(default)]
    pub target_position: f32,
    #[serde(default = "default_stiffness")]
    pub stiffness: f32,
    #[serde(default = "default_damping")]
    pub damping: f32,
}

impl MotorDescription {
    pub fn new(wheel: impl Into<String>) -> Self {
        Self {
            wheel: wheel.into(),
            axis: MotorAxis::default(),
            mode: DriveMode::default(),
            target_velocity: 0.0,
            velocity_factor: default_motor_factor(),
            target_position: 0.0,
            stiffness: default_stiffness(),
            damping: default_damping(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerDescription {
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_jump")]
    pub jump_impulse: f32,
}

impl Default for ControllerDescription {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            jump_impulse: default_jump(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaypointDescription {
    pub points: Vec<Vec3>,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default, rename = "loop")]
    pub looping: bool,
}

/// Visually authored script: the raw block list exported by the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScriptDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub blocks: Vec<serde_json::Value>,
}

fn default_color() -> Vec3 {
    Vec3::ONE
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

fn default_fov() -> f32 {
    45.0
}

fn default_near() -> f32 {
    0.1
}

fn default_far() -> f32 {
    100.0
}

fn default_intensity() -> f32 {
    1.0
}

fn default_mass() -> f32 {
    1.0
}

fn default_motor_factor() -> f32 {
    1.0
}

fn default_stiffness() -> f32 {
    10.0
}

fn default_damping() -> f32 {
    1.0
}

fn default_speed() -> f32 {
    5.0
}

fn default_jump() -> f32 {
    5.0
}

fn parse_object(node: &Node<'_, '_>) -> Result<SceneObject> {
    let name = required_text(node, "name")?;
    let tag = optional_text(node, "type").unwrap_or_else(|| "mesh".to_string());
    let mut kind = ObjectKind::from_tag(&tag).with_context(|| format!("object \"{name}\""))?;
    match &mut kind {
        ObjectKind::Mesh(mesh) => {
            mesh.mesh = optional_text(node, "mesh");
            mesh.color = parse_color(optional_text(node, "color"), mesh.color)?;
        }
        ObjectKind::Light(light) => {
            light.color = parse_color(optional_text(node, "color"), light.color)?;
            light.intensity = parse_f32(optional_text(node, "intensity"), light.intensity)?;
        }
        ObjectKind::Camera(camera) => {
            camera.fov = parse_f32(optional_text(node, "fov"), camera.fov)?;
        }
        ObjectKind::Group | ObjectKind::Storage => {}
    }

    let mut object = SceneObject::new(optional_text(node, "id").unwrap_or_default(), name, kind);
    object.position = parse_vec3(optional_text(node, "position"), object.position)?;
    object.rotation = parse_vec3(optional_text(node, "rotation"), object.rotation)?;
    object.scale = parse_vec3(optional_text(node, "scale"), object.scale)?;

    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "object" => object.children.push(parse_object(&child)?),
            "physics" => object.physics = Some(parse_physics(&child)?),
            "constraint" => {
                object.constraint = Some(ConstraintDescription {
                    body_a: child.attribute("body-a").map(str::to_string),
                    body_b: required_attribute(&child, "body-b")?,
                })
            }
            "motor" => object.motor = Some(parse_motor(&child)?),
            "controller" => {
                let defaults = ControllerDescription::default();
                object.controller = Some(ControllerDescription {
                    speed: parse_f32(attr(&child, "speed"), defaults.speed)?,
                    jump_impulse: parse_f32(attr(&child, "jump"), defaults.jump_impulse)?,
                });
            }
            "waypoints" => object.waypoints = Some(parse_waypoints(&child)?),
            "script" => {
                let source = child.text().map(str::trim).unwrap_or_default();
                let blocks: Vec<serde_json::Value> = if source.is_empty() {
                    Vec::new()
                } else {
                    serde_json::from_str(source)
                        .with_context(|| format!("script of \"{}\" is not a JSON block list", object.name))?
                };
                object.script = Some(ScriptDescription {
                    id: child.attribute("id").map(str::to_string),
                    blocks,
                });
            }
            "property" => {
                let key = required_attribute(&child, "name")?;
                let raw = child.text().map(str::trim).unwrap_or_default();
                let value = match raw.parse::<f64>() {
                    Ok(number) => serde_json::json!(number),
                    Err(_) => serde_json::Value::String(raw.to_string()),
                };
                object.properties.insert(key, value);
            }
            _ => {}
        }
    }
    Ok(object)
}

fn parse_physics(node: &Node<'_, '_>) -> Result<PhysicsDescription> {
    let body = match attr(node, "body").as_deref() {
        None | Some("dynamic") => BodyKind::Dynamic,
        Some("fixed") => BodyKind::Fixed,
        Some("kinematic") => BodyKind::Kinematic,
        Some(other) => return Err(anyhow!("unknown body kind \"{other}\"")),
    };
    let shape = match attr(node, "shape").as_deref() {
        None | Some("cuboid") => ShapeDescription::Cuboid {
            half_extents: parse_vec3(attr(node, "size"), Vec3::ONE)? * 0.5,
        },
        Some("ball") => ShapeDescription::Ball {
            radius: parse_f32(attr(node, "radius"), 0.5)?,
        },
        Some(other) => return Err(anyhow!("unknown collider shape \"{other}\"")),
    };
    Ok(PhysicsDescription {
        body,
        shape,
        mass: parse_f32(attr(node, "mass"), default_mass())?,
    })
}

fn parse_motor(node: &Node<'_, '_>) -> Result<MotorDescription> {
    let mut motor = MotorDescription::new(required_attribute(node, "wheel")?);
    motor.axis = match attr(node, "axis").as_deref() {
        None | Some("auto") => MotorAxis::Auto,
        Some("x") => MotorAxis::X,
        Some("y") => MotorAxis::Y,
        Some("z") => MotorAxis::Z,
        Some(other) => return Err(anyhow!("unknown motor axis \"{other}\"")),
    };
    motor.mode = match attr(node, "mode").as_deref() {
        None | Some("velocity") => DriveMode::Velocity,
        Some("position") => DriveMode::Position,
        Some(other) => return Err(anyhow!("unknown drive mode \"{other}\"")),
    };
    motor.target_velocity = parse_f32(attr(node, "target-velocity"), motor.target_velocity)?;
    motor.velocity_factor = parse_f32(attr(node, "factor"), motor.velocity_factor)?;
    motor.target_position = parse_f32(attr(node, "target-position"), motor.target_position)?;
    motor.stiffness = parse_f32(attr(node, "stiffness"), motor.stiffness)?;
    motor.damping = parse_f32(attr(node, "damping"), motor.damping)?;
    Ok(motor)
}

fn parse_waypoints(node: &Node<'_, '_>) -> Result<WaypointDescription> {
    let mut points = Vec::new();
    for point in node.children().filter(|n| n.has_tag_name("point")) {
        let text = point.text().map(str::trim).map(str::to_string);
        points.push(parse_vec3(text, Vec3::ZERO)?);
    }
    Ok(WaypointDescription {
        points,
        speed: parse_f32(attr(node, "speed"), default_speed())?,
        looping: matches!(attr(node, "loop").as_deref(), Some("true") | Some("1")),
    })
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn attr(node: &Node<'_, '_>, name: &str) -> Option<String> {
    node.attribute(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn required_attribute(node: &Node<'_, '_>, name: &str) -> Result<String> {
    attr(node, name).ok_or_else(|| {
        anyhow!(
            "<{}> is missing the \"{name}\" attribute",
            node.tag_name().name()
        )
    })
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let numbers = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f32>()
                .map_err(|err| anyhow!("bad vector component \"{part}\": {err}"))
        })
        .collect::<Result<Vec<_>>>()?;
    match numbers.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!("vector \"{value}\" needs exactly three components")),
    }
}

fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => Ok(parse_vec3(Some(value), default)? / 255.0),
        None => Ok(default),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}
