// ==========================================
// 全业务流程端到端测试
// ==========================================
// 场景: 受理 → 认领 → 找厂家 → 报价/发送 → 收款 → 发货 → 交付 → 提现
// ==========================================


#[cfg(test)]
mod full_business_flow_e2e_test {
    use std::sync::Arc;

    use sourcing_ops::api::QuoteInput;
    use sourcing_ops::app::AppState;
    use sourcing_ops::engine::events::NotificationDispatcher;
    use sourcing_ops::{ClaimOutcome, HandoffStatus, PaymentPurpose, PayoutStatus, StatusExtraFields};

    use crate::test_helpers::{
        admin, agent, approx, create_test_db, factory_fields, million_naira_quote, new_handoff,
        setup_env, shipping_fields, FailingDispatcher,
    };

    #[tokio::test]
    async fn test_full_flow_from_intake_to_payout() {
        let env = setup_env();
        let a = agent("agent_ada");
        let s = &env.state;

        s.claim_api.create_handoff(new_handoff("H-100"), "intake").unwrap();
        assert_eq!(s.claim_api.list_unassigned().unwrap().len(), 1);
        assert_eq!(s.claim_api.claim("H-100", &a).unwrap().outcome, ClaimOutcome::Claimed);
        assert!(s.claim_api.list_unassigned().unwrap().is_empty());
        // 认领只登记认领人，状态由代理推进
        assert_eq!(s.claim_api.get_handoff("H-100").unwrap().status, HandoffStatus::Pending);

        s.handoff_api
            .advance_status("H-100", HandoffStatus::Claimed, StatusExtraFields::default(), &a)
            .unwrap();
        s.handoff_api
            .advance_status("H-100", HandoffStatus::ManufacturerFound, factory_fields(), &a)
            .unwrap();

        let (items, rates) = million_naira_quote();
        let saved = s
            .quote_api
            .create_quote("H-100", QuoteInput::new(items, rates), &a)
            .unwrap();
        s.quote_api.send_quote(&saved.quote_id, &a).unwrap();

        // 客户按 token 查看
        let public = s.quote_api.get_quote_by_token(&saved.token).unwrap();
        assert!(public.sent_at.is_some());

        let deposit = s.quote_api.deposit_due(&saved.quote_id).unwrap();
        s.quote_api
            .record_payment(&saved.quote_id, deposit, PaymentPurpose::Deposit, &a)
            .unwrap();
        s.handoff_api
            .advance_status("H-100", HandoffStatus::Paid, StatusExtraFields::default(), &a)
            .unwrap();

        // 尾款未付，不能发货
        assert!(s
            .handoff_api
            .advance_status("H-100", HandoffStatus::Shipped, shipping_fields(), &a)
            .is_err());
        let balance = s
            .quote_api
            .record_payment(&saved.quote_id, 1_000_000.0 - deposit, PaymentPurpose::Product, &a)
            .unwrap();
        assert!(approx(balance, 0.0));
        s.handoff_api
            .advance_status("H-100", HandoffStatus::Shipped, shipping_fields(), &a)
            .unwrap();
        s.handoff_api
            .advance_status("H-100", HandoffStatus::Delivered, StatusExtraFields::default(), &a)
            .unwrap();

        let snap = s.ledger_api.compute_earnings("agent_ada").unwrap();
        assert!(approx(snap.gross_earned, 100_000.0));
        assert!(approx(snap.locked, 0.0));

        let payout = s
            .ledger_api
            .create_payout_request(&a, 100_000.0, None)
            .await
            .unwrap();
        s.ledger_api.approve_payout(&payout.payout_id, None, &admin()).unwrap();
        let paid = s
            .ledger_api
            .mark_payout_paid(&payout.payout_id, None, &admin())
            .unwrap();
        assert_eq!(paid.status, PayoutStatus::Paid);
        assert!(approx(s.ledger_api.compute_earnings("agent_ada").unwrap().available, 0.0));

        assert_eq!(
            env.events.names(),
            vec![
                "HandoffClaimed",
                "HandoffStatusChanged",
                "HandoffStatusChanged",
                "QuoteSent",
                "HandoffStatusChanged",
                "HandoffStatusChanged",
                "HandoffStatusChanged",
                "PayoutRequested",
            ]
        );
    }

    #[test]
    fn test_notification_failure_does_not_fail_operation() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        let dispatcher: Arc<dyn NotificationDispatcher> = Arc::new(FailingDispatcher);
        let state = AppState::with_dispatcher(db_path, Some(dispatcher)).unwrap();

        state.claim_api.create_handoff(new_handoff("H1"), "intake").unwrap();
        let r = state.claim_api.claim("H1", &agent("A")).unwrap();
        assert_eq!(r.outcome, ClaimOutcome::Claimed);
        assert_eq!(
            state.claim_api.get_handoff("H1").unwrap().assigned_agent_id.as_deref(),
            Some("A")
        );
    }

    #[test]
    fn test_state_survives_reopen() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        {
            let state = AppState::new(db_path.clone()).unwrap();
            state.claim_api.create_handoff(new_handoff("H1"), "intake").unwrap();
            state.claim_api.claim("H1", &agent("A")).unwrap();
            state
                .handoff_api
                .advance_status("H1", HandoffStatus::Claimed, StatusExtraFields::default(), &agent("A"))
                .unwrap();
            state
                .config_manager
                .set_global_config_value("markup_percent", "25")
                .unwrap();
        }

        let state = AppState::new(db_path).unwrap();
        let h = state.claim_api.get_handoff("H1").unwrap();
        assert_eq!(h.status, HandoffStatus::Claimed);
        // 已有配置不被默认值覆盖
        assert_eq!(
            state
                .config_manager
                .get_global_config_value("markup_percent")
                .unwrap()
                .as_deref(),
            Some("25")
        );
        let counts = state.handoff_repo.count_by_status().unwrap();
        assert_eq!(counts.get("claimed").copied(), Some(1));
    }
}
