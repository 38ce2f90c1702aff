use pulse_core::{
    classify, compile_prompt, explain, CampaignPayload, Channel, DataSource, FacetSelection,
};

const PROMPTS: [&str; 8] = [
    "Flash sale 20% off, email and sms",
    "VIP exclusive access event",
    "loyalty program, conversion 8%, click 3%",
    "Win back lapsed shoppers over whatsapp with discount code: COMEBACK15",
    "Retarget cart abandoners with ads on facebook and google",
    "Spring product launch for US and MX, a/b test subject lines",
    "Thank you for 5 years, anniversary email",
    "",
];

fn facet_grid() -> Vec<FacetSelection> {
    vec![
        FacetSelection::default(),
        FacetSelection::new(vec![DataSource::Shopify], vec![Channel::Sms]),
        FacetSelection::new(
            vec![DataSource::GoogleAdsTag, DataSource::FacebookPage],
            vec![Channel::WhatsApp, Channel::Ads, Channel::Email],
        ),
    ]
}

#[test]
fn flash_sale_prompt_compiles_to_email_and_sms() {
    let payload = compile_prompt("Flash sale 20% off, email and sms", &FacetSelection::default());

    assert!(payload.campaign_name.starts_with("Flash Sale:"));
    assert!(payload.campaign_name.contains("(20% OFF)"));

    let code = payload.offer.clone().expect("flash sale carries an offer");
    let library = payload.offers_library.clone().expect("offer library present");
    assert_eq!(library[&code].value, "20%");

    let channels = payload.channels();
    assert_eq!(channels, vec![Channel::Email, Channel::Sms]);
    assert_eq!(payload.workflow[1].requires_opt_in, Some(true));
    assert_eq!(payload.workflow[0].requires_opt_in, None);
}

#[test]
fn vip_exclusive_access_has_no_offer() {
    let payload = compile_prompt("VIP exclusive access event", &FacetSelection::default());
    let json = payload.to_pretty_json().expect("payload serializes");

    assert!(payload.offer.is_none());
    assert!(!json.contains("\"offer\""));
    assert!(!json.contains("offersLibrary"));
    assert!(payload.data_sources.contains(&DataSource::Shopify));
}

#[test]
fn exclusive_access_suppresses_any_offer_keyword() {
    for prompt in [
        "exclusive access flash sale 30% off",
        "Exclusive Access for loyalty members, discount code: EARLY5",
        "winback with exclusive access and a discount",
    ] {
        assert!(classify(prompt).offer.is_none(), "{prompt}");
    }
}

#[test]
fn loyalty_percentages_become_targets() {
    let payload = compile_prompt(
        "loyalty program, conversion 8%, click 3%",
        &FacetSelection::default(),
    );

    assert_eq!(payload.success_criteria.conversion_rate_target, ">= 0.08");
    assert_eq!(payload.success_criteria.click_rate_target, ">= 0.03");
}

#[test]
fn compliance_follows_workflow_channels() {
    for prompt in PROMPTS {
        for facets in facet_grid() {
            let payload = compile_prompt(prompt, &facets);
            let channels = payload.channels();

            assert_eq!(
                payload.compliance.sms_opt_in_required,
                channels.contains(&Channel::Sms),
                "{prompt:?} / {facets:?}"
            );
            assert_eq!(
                payload.compliance.whatsapp_opt_in_required,
                channels.contains(&Channel::WhatsApp),
                "{prompt:?} / {facets:?}"
            );
        }
    }
}

#[test]
fn selected_facets_follow_prompt_derived_ones() {
    let facets = FacetSelection::new(
        vec![DataSource::GoogleAdsTag, DataSource::Shopify],
        vec![Channel::Ads, Channel::Email],
    );
    let payload = compile_prompt("Flash sale 20% off, email and sms", &facets);

    assert_eq!(
        payload.channels(),
        vec![Channel::Email, Channel::Sms, Channel::Ads]
    );
    assert_eq!(
        payload.workflow[2].platforms,
        Some(vec!["Facebook".to_string(), "Google".to_string()])
    );
    assert!(payload.campaign_name.ends_with("Ads + Email (20% OFF)"));
}

#[test]
fn classification_is_deterministic() {
    for prompt in PROMPTS {
        assert_eq!(classify(prompt), classify(prompt));
    }
}

#[test]
fn pretty_json_parses_back_to_the_same_payload() {
    for prompt in PROMPTS {
        let payload = compile_prompt(prompt, &FacetSelection::default());
        let json = payload.to_pretty_json().expect("payload serializes");
        let parsed: CampaignPayload = serde_json::from_str(&json).expect("payload parses");

        assert_eq!(parsed, payload);
        assert!(json.starts_with("{\n  \""));
    }
}

#[test]
fn explanation_is_reproducible() {
    for prompt in PROMPTS {
        let payload = compile_prompt(prompt, &FacetSelection::default());
        assert_eq!(explain(&payload, prompt), explain(&payload, prompt));
    }
}
