// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scripted deferred-link timelines.
//!
//! A step is `kind@t` or `kind@t:arg`, applied in the order given with the
//! clock set to `t` seconds:
//!
//! | kind       | effect                                               |
//! |------------|------------------------------------------------------|
//! | `link`     | native bare deep link `arg` (empty or absent: none)  |
//! | `record`   | native link record whose deep link is `arg`          |
//! | `deferred` | register a deferred-link consumer                    |
//! | `singular` | register a singular-link consumer                    |
//! | `clear`    | unregister every consumer                            |

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use attrib_links::{
    Clock, ConsumerRole, DdlTimeout, LinkParams, LinkResolver, ManualClock, Timestamp,
};

/// What a step does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Inbound bare deep link.
    Link(Option<String>),
    /// Inbound link record.
    Record(Option<String>),
    /// Register a deferred consumer.
    RegisterDeferred,
    /// Register a singular consumer.
    RegisterSingular,
    /// Drop all consumers.
    Clear,
}

/// One timeline step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    /// Clock reading when the step runs.
    pub at: Timestamp,
    /// The step itself.
    pub action: Action,
}

impl FromStr for Step {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, rest) = s
            .split_once('@')
            .ok_or_else(|| anyhow!("step {s:?} is missing '@<seconds>'"))?;
        let (at, arg) = match rest.split_once(':') {
            Some((at, arg)) => (at, Some(arg)),
            None => (rest, None),
        };
        let at: Timestamp = at
            .parse()
            .with_context(|| format!("bad time in step {s:?}"))?;
        let text = arg.filter(|a| !a.is_empty()).map(str::to_owned);
        let action = match kind {
            "link" => Action::Link(text),
            "record" => Action::Record(text),
            "deferred" => Action::RegisterDeferred,
            "singular" => Action::RegisterSingular,
            "clear" => Action::Clear,
            other => bail!("unknown step kind {other:?}"),
        };
        Ok(Self { at, action })
    }
}

/// Run `steps` against a fresh resolver and describe every delivery, one per
/// line, followed by what is still cached.
pub fn simulate(steps: &[Step], ttl: DdlTimeout) -> String {
    let clock = ManualClock::starting_at(0);
    let mut resolver = LinkResolver::new(clock.clone(), ttl);
    let out = Rc::new(RefCell::new(String::new()));

    for step in steps {
        clock.set(step.at);
        match &step.action {
            Action::Link(text) => resolver.on_simple_deep_link(text.as_deref()),
            Action::Record(text) => resolver.on_link_resolved(LinkParams {
                deeplink: text.clone(),
                is_deferred: true,
                ..LinkParams::default()
            }),
            Action::RegisterDeferred => {
                let (out, clock) = (Rc::clone(&out), clock.clone());
                resolver.set_deferred_link_consumer(move |link: Option<&str>| {
                    let _ = writeln!(
                        out.borrow_mut(),
                        "t={} deferred <- {}",
                        clock.now_secs(),
                        link.unwrap_or("<none>")
                    );
                });
            }
            Action::RegisterSingular => {
                let (out, clock) = (Rc::clone(&out), clock.clone());
                resolver.set_singular_link_consumer(move |params: LinkParams| {
                    let _ = writeln!(
                        out.borrow_mut(),
                        "t={} singular <- {}",
                        clock.now_secs(),
                        params.deeplink.as_deref().unwrap_or("<none>")
                    );
                });
            }
            Action::Clear => {
                resolver.clear_consumer(ConsumerRole::SingularLink);
                resolver.clear_consumer(ConsumerRole::DeferredLink);
            }
        }
    }

    let mut report = out.borrow().clone();
    let _ = writeln!(
        report,
        "pending: link={} record={}",
        resolver.has_pending_link(),
        resolver.has_resolved_record()
    );
    report
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn steps(script: &[&str]) -> Vec<Step> {
        script.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn parses_steps() {
        let s: Step = "link@12:app://x".parse().unwrap();
        assert_eq!(s.at, 12);
        assert_eq!(s.action, Action::Link(Some("app://x".into())));
        let s: Step = "link@3".parse().unwrap();
        assert_eq!(s.action, Action::Link(None));
        assert!("teleport@1".parse::<Step>().is_err());
        assert!("deferred".parse::<Step>().is_err());
    }

    #[test]
    fn ttl_boundary() {
        let ttl = DdlTimeout::from_secs(60);
        let inside = simulate(&steps(&["link@0:x", "deferred@59"]), ttl);
        assert_eq!(inside, "t=59 deferred <- x\npending: link=false record=false\n");
        let outside = simulate(&steps(&["link@0:x", "deferred@61"]), ttl);
        assert_eq!(outside, "pending: link=false record=false\n");
    }

    #[test]
    fn singular_takes_priority() {
        let report = simulate(
            &steps(&["deferred@0", "singular@0", "record@5:app://r"]),
            DdlTimeout::unset(),
        );
        assert_eq!(report, "t=5 singular <- app://r\npending: link=false record=false\n");
    }

    #[test]
    fn record_waits_after_clear() {
        let script = steps(&["deferred@0", "clear@1", "record@2:r"]);
        let report = simulate(&script, DdlTimeout::unset());
        assert_eq!(report, "pending: link=false record=true\n");
    }
}
