use kiln_core::TargetKind;
use std::fmt;

pub const GENERIC_HANDLER_ID: &str = "generic";

/// Decides how one target kind is built.
pub trait KindHandler: fmt::Debug + Send + Sync {
    /// Output groups to request when building the target.
    fn output_groups(&self) -> Vec<String>;

    /// Extra build flags for targets of this kind.
    fn build_flags(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A handler with fixed output groups and flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticHandler {
    output_groups: Vec<String>,
    build_flags: Vec<String>,
}

impl StaticHandler {
    pub fn new<I, S>(output_groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            output_groups: output_groups.into_iter().map(Into::into).collect(),
            build_flags: Vec::new(),
        }
    }

    pub fn with_build_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build_flags = flags.into_iter().map(Into::into).collect();
        self
    }
}

impl KindHandler for StaticHandler {
    fn output_groups(&self) -> Vec<String> {
        self.output_groups.clone()
    }

    fn build_flags(&self) -> Vec<String> {
        self.build_flags.clone()
    }
}

type Predicate = Box<dyn Fn(&TargetKind) -> bool + Send + Sync>;
type Factory = Box<dyn Fn(&TargetKind) -> Box<dyn KindHandler> + Send + Sync>;

struct Registration {
    id: String,
    predicate: Predicate,
    factory: Factory,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Ordered `{predicate, factory}` registrations; the first predicate that accepts a kind wins.
///
/// Kinds nobody claims fall back to the generic handler, which requests the `default` output
/// group.
#[derive(Debug)]
pub struct HandlerRegistry {
    registrations: Vec<Registration>,
    generic: Registration,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// A registry with only the generic fallback.
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            generic: Registration {
                id: GENERIC_HANDLER_ID.to_string(),
                predicate: Box::new(|_: &TargetKind| true),
                factory: Box::new(|_: &TargetKind| -> Box<dyn KindHandler> {
                    Box::new(StaticHandler::new(["default"]))
                }),
            },
        }
    }

    /// Handlers for the rule families Kiln knows about.
    pub fn with_builtin_handlers() -> Self {
        let mut registry = Self::new();
        registry.register_static(
            "jvm",
            |kind| matches!(kind.language(), Some("java" | "kt" | "scala")),
            StaticHandler::new(["default", "_source_jars"]),
        );
        registry.register_static(
            "android",
            |kind| kind.as_str().starts_with("android_"),
            StaticHandler::new(["default", "android_deploy_info"]),
        );
        // Debug info for C++ targets that are run or debugged directly.
        registry.register_static(
            "cc",
            |kind| kind.language() == Some("cc") && kind.is_runnable(),
            StaticHandler::new(["default"]).with_build_flags(["--compilation_mode=dbg"]),
        );
        registry
    }

    /// Appends a registration; earlier registrations take precedence.
    ///
    /// Registering an id that already exists replaces the earlier entry in place.
    pub fn register<P, F, H>(&mut self, id: impl Into<String>, predicate: P, factory: F)
    where
        P: Fn(&TargetKind) -> bool + Send + Sync + 'static,
        F: Fn(&TargetKind) -> H + Send + Sync + 'static,
        H: KindHandler + 'static,
    {
        let registration = Registration {
            id: id.into(),
            predicate: Box::new(predicate),
            factory: Box::new(move |kind: &TargetKind| -> Box<dyn KindHandler> {
                Box::new(factory(kind))
            }),
        };
        match self
            .registrations
            .iter_mut()
            .find(|r| r.id == registration.id)
        {
            Some(existing) => *existing = registration,
            None => self.registrations.push(registration),
        }
    }

    /// Registers a handler that is the same for every matching kind.
    pub fn register_static<P>(
        &mut self,
        id: impl Into<String>,
        predicate: P,
        handler: StaticHandler,
    ) where
        P: Fn(&TargetKind) -> bool + Send + Sync + 'static,
    {
        self.register(id, predicate, move |_| handler.clone());
    }

    fn select(&self, kind: &TargetKind) -> &Registration {
        self.registrations
            .iter()
            .find(|r| (r.predicate)(kind))
            .unwrap_or(&self.generic)
    }

    /// Id of the registration that handles `kind`.
    pub fn find_id(&self, kind: &TargetKind) -> &str {
        &self.select(kind).id
    }

    /// Creates the handler for `kind`. Unclaimed kinds get the generic handler.
    pub fn find(&self, kind: &TargetKind) -> Box<dyn KindHandler> {
        let registration = self.select(kind);
        tracing::trace!(
            target = "kiln.build",
            kind = %kind,
            handler = %registration.id,
            "selected kind handler"
        );
        (registration.factory)(kind)
    }

    /// Creates a handler for `kind` through the registration named `id`, bypassing predicates.
    pub fn by_id(&self, id: &str, kind: &TargetKind) -> Option<Box<dyn KindHandler>> {
        self.registrations
            .iter()
            .chain(std::iter::once(&self.generic))
            .find(|r| r.id == id)
            .map(|r| (r.factory)(kind))
    }

    /// Registration ids in priority order, ending with the generic fallback.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.registrations
            .iter()
            .chain(std::iter::once(&self.generic))
            .map(|r| r.id.as_str())
    }
}
