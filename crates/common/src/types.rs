use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Caller name reported when a request has no originating guest screen.
pub const SYSTEM_CALLER: &str = "android";

/// Host-assigned task identifier. Never minted by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i32);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Virtual user a guest runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// Opaque host-issued token identifying one screen instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(pub String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Package + class identity of a guest component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentName {
    pub package: String,
    pub class: String,
}

impl ComponentName {
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
        }
    }

    /// `package/class`, the same shape the host uses for component strings.
    pub fn flatten(&self) -> String {
        format!("{}/{}", self.package, self.class)
    }

    /// Parses `package/class`; a leading `.` on the class is relative to the package.
    pub fn parse(raw: &str) -> Option<Self> {
        let (package, class) = raw.split_once('/')?;
        let package = package.trim();
        let class = class.trim();
        if package.is_empty() || class.is_empty() {
            return None;
        }
        let class = if class.starts_with('.') {
            format!("{package}{class}")
        } else {
            class.to_string()
        };
        Some(Self::new(package, class))
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.class)
    }
}

impl Serialize for ComponentName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.flatten())
    }
}

impl<'de> Deserialize<'de> for ComponentName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ComponentName::parse(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid component name '{raw}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMode {
    #[default]
    Standard,
    SingleTop,
    SingleTask,
    /// At most one instance of the component system-wide, alone in its task.
    SingleInstance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentLaunchMode {
    #[default]
    None,
    IntoExisting,
    Always,
    Never,
}

/// Directive flags carried by a navigation request.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LaunchFlags(u32);

impl LaunchFlags {
    pub const NEW_TASK: LaunchFlags = LaunchFlags(1 << 0);
    pub const MULTIPLE_TASK: LaunchFlags = LaunchFlags(1 << 1);
    pub const CLEAR_TOP: LaunchFlags = LaunchFlags(1 << 2);
    pub const CLEAR_TASK: LaunchFlags = LaunchFlags(1 << 3);
    pub const SINGLE_TOP: LaunchFlags = LaunchFlags(1 << 4);
    pub const REORDER_TO_FRONT: LaunchFlags = LaunchFlags(1 << 5);
    pub const RESET_TASK_IF_NEEDED: LaunchFlags = LaunchFlags(1 << 6);
    pub const NEW_DOCUMENT: LaunchFlags = LaunchFlags(1 << 7);

    const NAMES: [(LaunchFlags, &'static str); 8] = [
        (Self::NEW_TASK, "new_task"),
        (Self::MULTIPLE_TASK, "multiple_task"),
        (Self::CLEAR_TOP, "clear_top"),
        (Self::CLEAR_TASK, "clear_task"),
        (Self::SINGLE_TOP, "single_top"),
        (Self::REORDER_TO_FRONT, "reorder_to_front"),
        (Self::RESET_TASK_IF_NEEDED, "reset_task_if_needed"),
        (Self::NEW_DOCUMENT, "new_document"),
    ];

    pub const fn empty() -> Self {
        LaunchFlags(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        LaunchFlags(bits)
    }

    /// True when every bit of `other` is set.
    pub const fn contains(self, other: LaunchFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set.
    pub const fn intersects(self, other: LaunchFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: LaunchFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: LaunchFlags) {
        self.0 &= !other.0;
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::NAMES
            .iter()
            .find(|(_, candidate)| *candidate == normalized)
            .map(|(flag, _)| *flag)
    }
}

impl std::ops::BitOr for LaunchFlags {
    type Output = LaunchFlags;

    fn bitor(self, rhs: LaunchFlags) -> LaunchFlags {
        LaunchFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for LaunchFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LaunchFlags({})", self.names().join("|"))
    }
}

impl Serialize for LaunchFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LaunchFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        let mut flags = LaunchFlags::empty();
        for name in names {
            let flag = LaunchFlags::from_name(&name)
                .ok_or_else(|| D::Error::custom(format!("unknown launch flag '{name}'")))?;
            flags.insert(flag);
        }
        Ok(flags)
    }
}

/// Static description of a guest component, as declared by its package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub package: String,
    pub class: String,
    /// Sandbox process name; defaults to the package name.
    #[serde(default)]
    pub process_name: Option<String>,
    #[serde(default)]
    pub launch_mode: LaunchMode,
    #[serde(default)]
    pub document_launch_mode: DocumentLaunchMode,
    #[serde(default)]
    pub task_affinity: Option<String>,
    #[serde(default)]
    pub theme: Option<u32>,
    #[serde(default)]
    pub flags: u32,
}

impl ComponentDescriptor {
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
            process_name: None,
            launch_mode: LaunchMode::Standard,
            document_launch_mode: DocumentLaunchMode::None,
            task_affinity: None,
            theme: None,
            flags: 0,
        }
    }

    pub fn with_launch_mode(mut self, mode: LaunchMode) -> Self {
        self.launch_mode = mode;
        self
    }

    pub fn with_document_mode(mut self, mode: DocumentLaunchMode) -> Self {
        self.document_launch_mode = mode;
        self
    }

    pub fn with_affinity(mut self, affinity: impl Into<String>) -> Self {
        self.task_affinity = Some(affinity.into());
        self
    }

    pub fn with_theme(mut self, theme: u32) -> Self {
        self.theme = Some(theme);
        self
    }

    pub fn component_name(&self) -> ComponentName {
        ComponentName::new(self.package.clone(), self.class.clone())
    }

    pub fn process_name(&self) -> &str {
        self.process_name.as_deref().unwrap_or(&self.package)
    }

    /// Affinity used for task grouping. Single-instance components never share.
    pub fn task_affinity(&self) -> String {
        if self.launch_mode == LaunchMode::SingleInstance {
            return format!("-SingleInstance-{}/{}", self.package, self.class);
        }
        match self.task_affinity.as_deref() {
            Some(affinity) if !affinity.is_empty() => affinity.to_string(),
            _ => self.package.clone(),
        }
    }
}

/// A request to navigate to a guest component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationRequest {
    pub component: ComponentName,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    #[serde(default)]
    pub flags: LaunchFlags,
    #[serde(default)]
    pub extras: Option<Value>,
}

impl NavigationRequest {
    pub fn new(component: ComponentName) -> Self {
        Self {
            component,
            action: None,
            data: None,
            categories: BTreeSet::new(),
            flags: LaunchFlags::empty(),
            extras: None,
        }
    }

    pub fn to(descriptor: &ComponentDescriptor) -> Self {
        Self::new(descriptor.component_name())
    }

    pub fn with_flags(mut self, flags: LaunchFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Equal component, action, data and categories. Flags and extras are ignored.
    pub fn same_destination(&self, other: &NavigationRequest) -> bool {
        self.component == other.component
            && self.action == other.action
            && self.data == other.data
            && self.categories == other.categories
    }

    /// Grouping key for document-style launches.
    pub fn document_key(&self) -> (&ComponentName, Option<&str>) {
        (&self.component, self.data.as_deref())
    }
}
