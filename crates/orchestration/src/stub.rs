//! Placeholder selection.
//!
//! Every sandbox slot owns two pre-registered host identities, one plain and
//! one dialog-styled. The guest component's window style picks between them.

use std::sync::Arc;

use guesthost_common::{
    ComponentDescriptor, OrchestrationError, OrchestrationResult, PlaceholderConfig,
};
use tracing::{debug, warn};

use crate::backend::{ThemeResolver, WindowStyle};
use crate::types::{Placeholder, PlaceholderKind};

pub struct PlaceholderSelector {
    host_package: String,
    pool: PlaceholderConfig,
    primary: Arc<dyn ThemeResolver>,
    fallback: Option<Arc<dyn ThemeResolver>>,
}

impl PlaceholderSelector {
    pub fn new(
        host_package: impl Into<String>,
        pool: PlaceholderConfig,
        primary: Arc<dyn ThemeResolver>,
        fallback: Option<Arc<dyn ThemeResolver>>,
    ) -> Self {
        Self {
            host_package: host_package.into(),
            pool,
            primary,
            fallback,
        }
    }

    /// Primary resolver first, fallback on a miss. Any failure reads as "no style".
    pub fn window_style(&self, component: &ComponentDescriptor) -> WindowStyle {
        let resolvers = std::iter::once(&self.primary).chain(self.fallback.iter());
        for resolver in resolvers {
            match resolver.resolve_window_style(&component.package, component.theme) {
                Ok(Some(style)) => return style,
                Ok(None) => continue,
                Err(err) => {
                    warn!(
                        "window style lookup failed for {}/{}: {}",
                        component.package, component.class, err
                    );
                    return WindowStyle::default();
                }
            }
        }
        WindowStyle::default()
    }

    pub fn kind_for(&self, component: &ComponentDescriptor) -> PlaceholderKind {
        if self.window_style(component).is_dialog() {
            PlaceholderKind::Dialog
        } else {
            PlaceholderKind::Normal
        }
    }

    pub fn select(
        &self,
        component: &ComponentDescriptor,
        slot: usize,
    ) -> OrchestrationResult<Placeholder> {
        if slot >= self.pool.slots {
            return Err(OrchestrationError::NoPlaceholder {
                slot,
                pool_size: self.pool.slots,
            });
        }

        let kind = self.kind_for(component);
        let class = match kind {
            PlaceholderKind::Normal => &self.pool.normal_class,
            PlaceholderKind::Dialog => &self.pool.dialog_class,
        };
        let placeholder = Placeholder {
            host_package: self.host_package.clone(),
            class_name: format!("{}.{}$P{}", self.host_package, class, slot),
            kind,
            slot,
        };
        debug!(
            component = %component.component_name(),
            placeholder = %placeholder.class_name,
            "selected placeholder"
        );
        Ok(placeholder)
    }
}
