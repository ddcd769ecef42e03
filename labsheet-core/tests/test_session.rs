mod common;
use chrono::NaiveDate;
use common::{sample_config, sample_template};
use labsheet_core::{ConfigError, Session};

#[test]
fn test_session_operator_defaults_to_first_configured() -> anyhow::Result<()> {
    let mut config = sample_config()?;
    let mut session = Session::new();
    assert_eq!(session.operator(&config), "Alice");

    session.select_operator(&config, "Bob")?;
    assert_eq!(session.operator(&config), "Bob");
    assert_eq!(
        session.select_operator(&config, "Mallory"),
        Err(ConfigError::UnknownOperator("Mallory".to_string()))
    );
    assert_eq!(session.operator(&config), "Bob");

    let today = NaiveDate::from_ymd_opt(2024, 5, 6).ok_or_else(|| anyhow::anyhow!("bad date"))?;
    let ctx = session.context(&config, today);
    assert_eq!(ctx.operator, "Bob");
    assert_eq!(ctx.today, today);

    config.experimenters.clear();
    assert_eq!(Session::new().operator(&config), "");
    Ok(())
}

#[test]
fn test_session_keeps_one_form_per_template() -> anyhow::Result<()> {
    let config = sample_config()?;
    let template = sample_template()?;
    let mut session = Session::new();
    assert_ne!(session.id(), Session::new().id());

    let form_id = {
        let form = session.open_form(&template);
        form.set_text(&template, "exp_code", "A1")?;
        form.id()
    };
    let reopened = session.open_form(&template);
    assert_eq!(reopened.id(), form_id);
    assert_eq!(reopened.record().get_str("exp_code"), Some("A1"));

    let synthesis = config.template("synthesis").expect("synthesis template");
    session.open_form(synthesis);
    let mut open: Vec<&str> = session.open_forms().collect();
    open.sort();
    assert_eq!(open, vec!["electrochem", "synthesis"]);

    if let Some(form) = session.form_mut("synthesis") {
        form.set_text(synthesis, "exp_code", "S1")?;
    }
    assert_eq!(
        session
            .form("synthesis")
            .and_then(|f| f.record().get_str("exp_code")),
        Some("S1")
    );

    let closed = session.close_form("electrochem").expect("form was open");
    assert_eq!(closed.template_type(), "electrochem");
    assert!(session.form("electrochem").is_none());
    assert!(session.open_form(&template).record().is_empty());
    Ok(())
}
