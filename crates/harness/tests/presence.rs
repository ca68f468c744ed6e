use advance_client::MemoryView;
use advance_core::{
    FieldKind, ShowId, UserId, UserRef,
    presence::{PALETTE, color_for},
};
use advance_harness::{TestNetwork, TestPeer};

fn view() -> MemoryView {
    MemoryView::new()
        .with_field("arrival_time", FieldKind::Text)
        .with_field("runner_name", FieldKind::Text)
}

fn names(peer: &TestPeer) -> Vec<String> {
    peer.view().presence.iter().map(|u| u.name.clone()).collect()
}

#[test]
fn pages_see_each_other_but_not_themselves() -> Result<(), Box<dyn std::error::Error>> {
    let net = TestNetwork::new()?;
    let show = ShowId::new(1);
    let mut a = net.open_page(show, UserRef::new(1, "Ann Lee"), "advance", view());
    let mut b = net.open_page(show, UserRef::new(2, "Bo Chan"), "advance", view());

    a.tick();
    assert!(a.view().presence.is_empty());
    b.tick();
    assert_eq!(names(&b), ["Ann Lee"]);

    net.advance(3_000);
    a.tick();
    assert_eq!(names(&a), ["Bo Chan"]);
    let badge = &a.view().presence[0];
    assert_eq!(badge.initials, "BC");
    assert_eq!(badge.color, color_for("Bo Chan"));
    assert!(PALETTE.contains(&badge.color.as_str()));
    // Every page computes the same badge for the same person.
    assert_eq!(b.view().presence[0].color, color_for("Ann Lee"));
    Ok(())
}

#[test]
fn silent_page_drops_out_after_expiry() -> Result<(), Box<dyn std::error::Error>> {
    let net = TestNetwork::new()?;
    let show = ShowId::new(1);
    let mut a = net.open_page(show, UserRef::new(1, "Ann Lee"), "advance", view());
    let mut b = net.open_page(show, UserRef::new(2, "Bo Chan"), "advance", view());
    b.tick();
    a.tick();
    assert_eq!(names(&a), ["Bo Chan"]);

    b.set_offline(true);
    let expiry = net.config().presence_expiry_ms;
    let mut elapsed = 0;
    while elapsed + 3_000 < expiry {
        net.advance(3_000);
        elapsed += 3_000;
        b.tick();
        a.tick();
        assert_eq!(names(&a), ["Bo Chan"], "still present after {elapsed} ms");
    }
    net.advance(expiry - elapsed);
    a.tick();
    assert!(a.view().presence.is_empty());

    // Coming back refreshes the same entry.
    b.set_offline(false);
    net.advance(3_000);
    b.tick();
    a.tick();
    assert_eq!(names(&a), ["Bo Chan"]);
    Ok(())
}

#[test]
fn focus_and_tab_show_up_for_others() -> Result<(), Box<dyn std::error::Error>> {
    let net = TestNetwork::new()?;
    let show = ShowId::new(1);
    let mut a = net.open_page(show, UserRef::new(1, "Ann Lee"), "advance", view());
    let mut b = net.open_page(show, UserRef::new(2, "Bo Chan"), "advance", view());
    let mut c = net.open_page(show, UserRef::new(3, "Cy Dorn"), "schedule", view());

    b.client.focus("runner_name");
    b.tick();
    c.tick();
    a.tick();

    let markers = a.view().remote_focus();
    assert_eq!(markers.get("runner_name"), Some(&vec![UserId::new(2)]));
    let cy = a
        .view()
        .presence
        .iter()
        .find(|u| u.user_id == UserId::new(3))
        .ok_or("Cy missing")?;
    assert_eq!(cy.tab, "schedule");
    assert_eq!(cy.focused_field, None);

    // Blur is reported on the next poll.
    b.blur("runner_name");
    net.advance(3_000);
    b.tick();
    a.tick();
    assert!(a.view().remote_focus().is_empty());
    Ok(())
}

#[test]
fn presence_is_per_show() -> Result<(), Box<dyn std::error::Error>> {
    let net = TestNetwork::new()?;
    let mut a = net.open_page(ShowId::new(1), UserRef::new(1, "Ann Lee"), "advance", view());
    let mut b = net.open_page(ShowId::new(2), UserRef::new(2, "Bo Chan"), "advance", view());
    b.tick();
    a.tick();
    assert!(a.view().presence.is_empty());
    Ok(())
}

#[test]
fn one_entry_per_user_across_tabs() -> Result<(), Box<dyn std::error::Error>> {
    let net = TestNetwork::new()?;
    let show = ShowId::new(1);
    let ann = UserRef::new(1, "Ann Lee");
    let mut first = net.open_page(show, ann.clone(), "advance", view());
    let mut second = net.open_page(show, ann, "schedule", view());
    first.tick();
    second.tick();

    let active = net.engine().list_active(show)?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].tab, "schedule");
    Ok(())
}

#[test]
fn listing_is_ordered_by_name() -> Result<(), Box<dyn std::error::Error>> {
    let net = TestNetwork::new()?;
    let show = ShowId::new(1);
    let mut engine = net.engine();
    for (id, name) in [(3, "Zoe Ray"), (1, "Ann Lee"), (2, "Mo Diaz")] {
        engine.touch_presence(show, &UserRef::new(id, name), "advance", None)?;
    }
    let listed: Vec<_> = engine.list_active(show)?.into_iter().map(|u| u.name).collect();
    assert_eq!(listed, ["Ann Lee", "Mo Diaz", "Zoe Ray"]);
    Ok(())
}
