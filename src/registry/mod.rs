//! Process-wide error registry
//!
//! Maps stable names to templates, construction functions, codes, alert
//! thresholds, and localized messages; counts occurrences per name through
//! the sharded counter; remembers the most recent instance; and dispatches
//! alerts when a name's total crosses its threshold.

pub(crate) mod counter;
pub(crate) mod monitor;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::config;
use crate::error::Error;
use self::counter::ShardedCounter;
pub use self::monitor::Monitor;

/// Registered construction function.
pub type ErrorFn = Arc<dyn Fn(&[&dyn fmt::Display]) -> Error + Send + Sync>;

pub(crate) struct Registry {
    pub(crate) templates: DashMap<String, String>,
    pub(crate) funcs: DashMap<String, ErrorFn>,
    pub(crate) codes: DashMap<String, i32>,
    pub(crate) thresholds: DashMap<String, u64>,
    pub(crate) alerts: DashMap<String, (Sender<Error>, Receiver<Error>)>,
    pub(crate) counter: ShardedCounter,
    pub(crate) last: DashMap<String, Error>,
    pub(crate) locales: DashMap<String, String>,
    pub(crate) dropped_alerts: AtomicU64,
}

static REGISTRY: Lazy<Registry> = Lazy::new(|| Registry {
    templates: DashMap::new(),
    funcs: DashMap::new(),
    codes: DashMap::new(),
    thresholds: DashMap::new(),
    alerts: DashMap::new(),
    counter: ShardedCounter::new(),
    last: DashMap::new(),
    locales: DashMap::new(),
    dropped_alerts: AtomicU64::new(0),
});

pub(crate) fn global() -> &'static Registry {
    &REGISTRY
}

/// Named message template registered with [`define`], [`coded`], or
/// [`categorized`]. Each [`Template::format`] call produces a fresh error
/// with the rendered message, the name set, the occurrence counted, the
/// last instance remembered, and the threshold checked.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    template: String,
    code: i32,
    category: String,
}

impl Template {
    /// The registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw template string.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render the template against `args` and produce a counted error.
    pub fn format(&self, args: &[&dyn fmt::Display]) -> Error {
        let msg = render_template(&self.template, args);
        let mut err = Error::new(msg)
            .with_name(&self.name)
            .with_template(&self.template);
        if self.code != 0 {
            err = err.with_code(self.code);
        }
        if !self.category.is_empty() {
            err = err.with_category(&self.category);
        }
        err = err.with_stack();
        record(&self.name, &err);
        err
    }
}

/// Substitute `{}` placeholders positionally. Placeholders beyond the
/// supplied arguments stay literal; surplus arguments are ignored.
fn render_template(template: &str, args: &[&dyn fmt::Display]) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity(template.len() + args.len() * 8);
    let mut rest = template;
    let mut next = 0;
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        match args.get(next) {
            Some(arg) => {
                let _ = write!(out, "{}", arg);
                next += 1;
            }
            None => out.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

/// Count an occurrence of `name`, stamp the total into `err`, remember the
/// instance, and check the alert threshold. No-op while the registry is
/// disabled.
fn record(name: &str, err: &Error) {
    if config::snapshot().disable_registry {
        return;
    }
    let total = global().counter.inc(name);
    err.set_count(total);
    update_last(err);
    check_threshold(name);
}

fn update_last(err: &Error) {
    if err.name().is_empty() {
        return;
    }
    global().last.insert(err.name().to_string(), err.clone());
}

fn check_threshold(name: &str) {
    let reg = global();
    let threshold = match reg.thresholds.get(name) {
        Some(threshold) => *threshold.value(),
        None => return,
    };
    let total = reg.counter.value(name);
    if total >= threshold {
        monitor::dispatch(name, total);
    }
}

/// Register a message template under `name` and return the construction
/// handle.
pub fn define(name: impl Into<String>, template: impl Into<String>) -> Template {
    let name = name.into();
    let template = template.into();
    let reg = global();
    reg.templates.insert(name.clone(), template.clone());
    if !config::snapshot().disable_registry {
        reg.counter.register_name(&name);
    }
    Template {
        name,
        template,
        code: 0,
        category: String::new(),
    }
}

/// [`define`] plus a numeric code stored in the registry and stamped on
/// every rendered error.
pub fn coded(name: impl Into<String>, code: i32, template: impl Into<String>) -> Template {
    let mut tmpl = define(name, template);
    global().codes.insert(tmpl.name.clone(), code);
    tmpl.code = code;
    tmpl
}

/// [`define`] plus a category tag stamped on every rendered error.
pub fn categorized(
    category: impl Into<String>,
    name: impl Into<String>,
    template: impl Into<String>,
) -> Template {
    let mut tmpl = define(name, template);
    tmpl.category = category.into();
    tmpl
}

/// Custom construction function registered under `name`. Each invocation
/// counts, dispatches to the function, and updates the last instance.
pub struct Callable {
    name: String,
    func: ErrorFn,
}

impl Callable {
    /// The registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Count an invocation and delegate to the registered function.
    pub fn call(&self, args: &[&dyn fmt::Display]) -> Error {
        let err = (self.func)(args);
        record(&self.name, &err);
        err
    }
}

/// Register `f` as a construction function under `name`.
pub fn callable<F>(name: impl Into<String>, f: F) -> Callable
where
    F: Fn(&[&dyn fmt::Display]) -> Error + Send + Sync + 'static,
{
    let name = name.into();
    let func: ErrorFn = Arc::new(f);
    let reg = global();
    reg.funcs.insert(name.clone(), Arc::clone(&func));
    if !config::snapshot().disable_registry {
        reg.counter.register_name(&name);
    }
    Callable { name, func }
}

/// Error bound to a callable target: the name derives from the target's
/// type path (closures render as their definition site), falling back to
/// `"unknown"` when empty.
pub fn func_error<F>(_target: &F, msg: &str) -> Error {
    let type_name = std::any::type_name::<F>();
    let name = if type_name.is_empty() {
        "unknown"
    } else {
        type_name
    };
    let err = Error::new(format!("{}: {}", name, msg))
        .with_name(name)
        .with_stack();
    record(name, &err);
    err
}

/// Configure the alert threshold for `name`. The check runs after every
/// counted occurrence.
pub fn set_threshold(name: impl Into<String>, count: u64) {
    global().thresholds.insert(name.into(), count);
}

/// Numeric code registered for `name`, if any.
pub(crate) fn code_for(name: &str) -> Option<i32> {
    global().codes.get(name).map(|code| *code.value())
}

/// Most recent instance produced for `name`, if any.
pub fn last_error(name: &str) -> Option<Error> {
    global().last.get(name).map(|entry| entry.value().clone())
}

/// All names known to the counter.
pub fn names() -> Vec<String> {
    global().counter.names()
}

/// Snapshot of nonzero per-name totals. `None` while the registry is
/// disabled.
pub fn metrics() -> Option<HashMap<String, u64>> {
    if config::snapshot().disable_registry {
        return None;
    }
    let reg = global();
    let mut counts = HashMap::new();
    for name in reg.counter.names() {
        let total = reg.counter.value(&name);
        if total > 0 {
            counts.insert(name, total);
        }
    }
    Some(counts)
}

/// Zero the counter and forget the last instance for `name`. No-op while
/// the registry is disabled.
pub fn reset_counter(name: &str) {
    if config::snapshot().disable_registry {
        return;
    }
    global().counter.reset(name);
    global().last.remove(name);
}

/// Clear every counter and last instance. No-op while the registry is
/// disabled.
pub fn reset_registry() {
    if config::snapshot().disable_registry {
        return;
    }
    let reg = global();
    for name in reg.counter.names() {
        reg.counter.remove(&name);
    }
    reg.last.clear();
}

/// Register localized messages keyed `"<locale>.<name>"`.
pub fn set_locales(locales: HashMap<String, String>) {
    let reg = global();
    for (key, value) in locales {
        reg.locales.insert(key, value);
    }
}

/// Localized message for `(locale, name)`, if registered.
pub(crate) fn localized(locale: &str, name: &str) -> Option<String> {
    global()
        .locales
        .get(&format!("{}.{}", locale, name))
        .map(|entry| entry.value().clone())
}

/// Total alerts dropped on full or closed channels since process start.
pub fn dropped_alerts() -> u64 {
    global().dropped_alerts.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support;

    #[test]
    fn test_define_renders_and_counts() {
        let _g = test_support::lock();
        config::reset_config();

        let tmpl = define("RegDefine", "failed: {} ({})");
        let err = tmpl.format(&[&"disk", &3]);

        assert_eq!(err.message(), "failed: disk (3)");
        assert_eq!(err.name(), "RegDefine");
        assert_eq!(err.template(), "failed: {} ({})");
        assert!(err.count() >= 1);
        assert!(err.frames().is_some());

        reset_counter("RegDefine");
    }

    #[test]
    fn test_template_placeholders_without_args_stay_literal() {
        let rendered = render_template("a {} b {}", &[&1]);
        assert_eq!(rendered, "a 1 b {}");
        let rendered = render_template("no holes", &[&1]);
        assert_eq!(rendered, "no holes");
    }

    #[test]
    fn test_coded_applies_instance_and_registry_code() {
        let _g = test_support::lock();
        config::reset_config();

        let tmpl = coded("RegCoded", 404, "missing: {}");
        let err = tmpl.format(&[&"user"]);
        assert_eq!(err.code(), 404);
        assert_eq!(code_for("RegCoded"), Some(404));

        // A bare named value picks the code up from the registry.
        let named = Error::empty().with_name("RegCoded");
        assert_eq!(named.code(), 404);

        reset_counter("RegCoded");
    }

    #[test]
    fn test_categorized_tags_category() {
        let _g = test_support::lock();
        config::reset_config();

        let tmpl = categorized("database", "RegCat", "db: {}");
        let err = tmpl.format(&[&"down"]);
        assert_eq!(err.category(), "database");

        reset_counter("RegCat");
    }

    #[test]
    fn test_callable_counts_and_tracks_last() {
        let _g = test_support::lock();
        config::reset_config();

        let callable = callable("RegCallable", |args| {
            let detail = args
                .first()
                .map(|a| a.to_string())
                .unwrap_or_default();
            Error::new(format!("custom: {}", detail)).with_name("RegCallable")
        });

        let first = callable.call(&[&"one"]);
        let second = callable.call(&[&"two"]);
        assert_eq!(first.message(), "custom: one");
        assert!(second.count() > first.count());

        let last = last_error("RegCallable").expect("last tracked");
        assert_eq!(last.message(), "custom: two");

        reset_counter("RegCallable");
    }

    #[test]
    fn test_func_error_derives_name() {
        let _g = test_support::lock();
        config::reset_config();

        fn target() {}
        let err = func_error(&target, "exploded");
        assert!(!err.name().is_empty());
        assert!(err.message().ends_with(": exploded"));

        reset_counter(err.name());
    }

    #[test]
    fn test_metrics_reports_nonzero_only() {
        let _g = test_support::lock();
        config::reset_config();

        let tmpl = define("RegMetrics", "m: {}");
        define("RegMetricsIdle", "never used: {}");
        tmpl.format(&[&1]).free();
        tmpl.format(&[&2]).free();

        let metrics = metrics().expect("registry enabled");
        assert!(metrics.get("RegMetrics").copied().unwrap_or(0) >= 2);
        assert!(!metrics.contains_key("RegMetricsIdle"));

        reset_counter("RegMetrics");
    }

    #[test]
    fn test_last_error_and_reset() {
        let _g = test_support::lock();
        config::reset_config();

        let tmpl = define("RegLast", "l: {}");
        tmpl.format(&[&"x"]).free();
        assert!(last_error("RegLast").is_some());

        reset_counter("RegLast");
        assert!(last_error("RegLast").is_none());
        assert_eq!(global().counter.value("RegLast"), 0);
    }

    #[test]
    fn test_disabled_registry_suppresses_side_effects() {
        let _g = test_support::lock();
        config::reset_config();
        reset_registry();
        config::configure(|c| c.disable_registry = true);

        let tmpl = define("RegDisabled", "d: {}");
        for _ in 0..100 {
            let err = tmpl.format(&[&"x"]);
            // Rendering still works while tracking is off.
            assert_eq!(err.message(), "d: x");
            assert_eq!(err.count(), 0);
            err.free();
        }

        assert!(metrics().is_none());
        assert!(last_error("RegDisabled").is_none());

        config::reset_config();
    }

    #[test]
    fn test_locales_lookup() {
        let _g = test_support::lock();
        config::reset_config();

        define("RegLocale", "not found: {}");
        let mut locales = HashMap::new();
        locales.insert("de.RegLocale".to_string(), "nicht gefunden".to_string());
        set_locales(locales);

        let err = Error::empty().with_name("RegLocale");
        assert_eq!(err.message_localized("de"), "nicht gefunden");
        assert_eq!(err.message_localized("fr"), "RegLocale");

        reset_counter("RegLocale");
    }
}
