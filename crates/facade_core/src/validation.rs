//! Statically registered validation rules.
//!
//! # Responsibility
//! - Hold the constraint set of one entity type, built once by
//!   [`crate::Entity::rules`].
//! - Evaluate every rule and collect violation messages in registration order.
//!
//! # Invariants
//! - Evaluation is never fail-fast: all violations are reported.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Debug, Formatter};

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is a valid regex")
});

type Check<E> = Box<dyn Fn(&E) -> bool>;

/// One named constraint over an entity.
pub struct Rule<E> {
    field: &'static str,
    message: String,
    check: Check<E>,
}

impl<E> Rule<E> {
    /// Creates a rule that passes when `check` returns `true`.
    pub fn new(
        field: &'static str,
        message: impl Into<String>,
        check: impl Fn(&E) -> bool + 'static,
    ) -> Self {
        Self {
            field,
            message: message.into(),
            check: Box::new(check),
        }
    }

    /// Replaces the violation message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_satisfied_by(&self, entity: &E) -> bool {
        (self.check)(entity)
    }
}

impl<E> Debug for Rule<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("field", &self.field)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Ordered rule set for one entity type.
#[derive(Debug)]
pub struct RuleSet<E> {
    rules: Vec<Rule<E>>,
}

impl<E> Default for RuleSet<E> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<E> RuleSet<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule, builder style.
    pub fn with(mut self, rule: Rule<E>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn push(&mut self, rule: Rule<E>) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the messages of every violated rule, in registration order.
    pub fn validate(&self, entity: &E) -> Vec<String> {
        self.rules
            .iter()
            .filter(|rule| !rule.is_satisfied_by(entity))
            .map(|rule| rule.message.clone())
            .collect()
    }
}

/// Requires a text field to contain at least one non-whitespace character.
pub fn not_blank<E: 'static>(field: &'static str, get: fn(&E) -> &str) -> Rule<E> {
    Rule::new(
        field,
        format!("{field} should not be blank"),
        move |entity| !get(entity).trim().is_empty(),
    )
}

/// Requires a text field's character count to lie within `min..=max`.
pub fn length<E: 'static>(
    field: &'static str,
    min: usize,
    max: usize,
    get: fn(&E) -> &str,
) -> Rule<E> {
    Rule::new(
        field,
        format!("{field} should have between {min} and {max} characters"),
        move |entity| (min..=max).contains(&get(entity).chars().count()),
    )
}

/// Requires an integer field to lie within `min..=max`.
pub fn range<E: 'static>(field: &'static str, min: i64, max: i64, get: fn(&E) -> i64) -> Rule<E> {
    Rule::new(
        field,
        format!("{field} should be between {min} and {max}"),
        move |entity| (min..=max).contains(&get(entity)),
    )
}

/// Requires a text field to match `pattern`.
pub fn pattern<E: 'static>(
    field: &'static str,
    pattern: Regex,
    get: fn(&E) -> &str,
) -> Rule<E> {
    Rule::new(
        field,
        format!("{field} is not valid"),
        move |entity| pattern.is_match(get(entity)),
    )
}

/// Requires a non-empty text field to look like an e-mail address.
///
/// Empty values pass; combine with [`not_blank`] when the field is required.
pub fn email<E: 'static>(field: &'static str, get: fn(&E) -> &str) -> Rule<E> {
    Rule::new(
        field,
        format!("{field} is not a valid email address"),
        move |entity| {
            let value = get(entity);
            value.is_empty() || EMAIL_PATTERN.is_match(value)
        },
    )
}

#[cfg(test)]
mod tests {
    use super::{email, length, not_blank, pattern, range, Rule, RuleSet};
    use regex::Regex;

    #[derive(Default)]
    struct Account {
        name: String,
        email: String,
        age: i64,
    }

    fn name(account: &Account) -> &str {
        &account.name
    }

    fn email_of(account: &Account) -> &str {
        &account.email
    }

    fn age(account: &Account) -> i64 {
        account.age
    }

    fn account_rules() -> RuleSet<Account> {
        RuleSet::new()
            .with(not_blank("name", name))
            .with(length("name", 2, 8, name))
            .with(email("email", email_of))
            .with(range("age", 0, 150, age))
    }

    #[test]
    fn valid_entity_has_no_violations() {
        let account = Account {
            name: "ana".to_string(),
            email: "ana@example.com".to_string(),
            age: 30,
        };
        assert!(account_rules().validate(&account).is_empty());
    }

    #[test]
    fn all_violations_are_reported_in_registration_order() {
        let account = Account {
            name: String::new(),
            email: "nope".to_string(),
            age: 200,
        };
        let violations = account_rules().validate(&account);

        assert_eq!(
            violations,
            vec![
                "name should not be blank",
                "name should have between 2 and 8 characters",
                "email is not a valid email address",
                "age should be between 0 and 150",
            ]
        );
    }

    #[test]
    fn custom_rule_message_can_be_replaced() {
        let rules = RuleSet::new().with(
            Rule::new("age", "too young", |a: &Account| a.age >= 18)
                .with_message("must be an adult"),
        );
        let violations = rules.validate(&Account::default());
        assert_eq!(violations, vec!["must be an adult"]);
    }

    #[test]
    fn pattern_rule_matches_against_field() {
        let rules = RuleSet::new().with(pattern(
            "name",
            Regex::new("^[a-z]+$").unwrap(),
            name,
        ));

        let lower = Account {
            name: "ana".to_string(),
            ..Account::default()
        };
        let mixed = Account {
            name: "Ana1".to_string(),
            ..Account::default()
        };
        assert!(rules.validate(&lower).is_empty());
        assert_eq!(rules.validate(&mixed), vec!["name is not valid"]);
    }
}
