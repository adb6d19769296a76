// ==========================================
// LedgerApi 集成测试
// ==========================================
// 职责: 收益派生、提现校验与审批流转
// ==========================================


#[cfg(test)]
mod ledger_api_test {
    use sourcing_ops::api::QuoteInput;
    use sourcing_ops::{ErrorKind, HandoffStatus, PaymentPurpose, PayoutStatus, StatusExtraFields};

    use crate::test_helpers::{
        admin, agent, approx, handoff_at_manufacturer_found, million_naira_quote, setup_env,
        shipping_fields, TestEnv,
    };

    // ==========================================
    // 测试辅助函数
    // ==========================================

    /// 已发货项目：佣金 100,000，锁定 20%
    fn shipped_project(env: &TestEnv, id: &str, agent_id: &str) {
        let who = agent(agent_id);
        handoff_at_manufacturer_found(env, id, agent_id);
        let (items, rates) = million_naira_quote();
        let saved = env
            .state
            .quote_api
            .create_quote(id, QuoteInput::new(items, rates), &who)
            .unwrap();
        assert!(approx(saved.totals.total_due_ngn, 1_000_000.0));
        env.state
            .quote_api
            .record_payment(&saved.quote_id, 1_000_000.0, PaymentPurpose::Product, &who)
            .unwrap();
        env.state
            .handoff_api
            .advance_status(id, HandoffStatus::Shipped, shipping_fields(), &who)
            .unwrap();
    }

    // ==========================================
    // 收益快照
    // ==========================================

    #[test]
    fn test_commission_recognition_by_status() {
        let env = setup_env();
        let ledger = &env.state.ledger_api;

        // 未发货、无报价：无佣金
        handoff_at_manufacturer_found(&env, "H0", "A");
        let snap = ledger.compute_earnings("A").unwrap();
        assert!(approx(snap.gross_earned, 0.0));
        assert!(approx(snap.available, 0.0));

        shipped_project(&env, "H1", "A");
        let snap = ledger.compute_earnings("A").unwrap();
        assert!(approx(snap.gross_earned, 100_000.0));
        assert!(approx(snap.locked, 20_000.0));
        assert!(approx(snap.paid_out, 0.0));
        assert!(approx(snap.available, 80_000.0));

        let lines = ledger.commission_lines("A").unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].handoff_id, "H1");

        // 交付后锁定释放
        env.state
            .handoff_api
            .advance_status("H1", HandoffStatus::Delivered, StatusExtraFields::default(), &agent("A"))
            .unwrap();
        let snap = ledger.compute_earnings("A").unwrap();
        assert!(approx(snap.locked, 0.0));
        assert!(approx(snap.available, 100_000.0));

        // 其他代理不受影响
        assert!(approx(ledger.compute_earnings("B").unwrap().gross_earned, 0.0));
    }

    #[test]
    fn test_cancelled_project_earns_nothing() {
        let env = setup_env();
        handoff_at_manufacturer_found(&env, "H1", "A");
        env.state
            .handoff_api
            .advance_status(
                "H1",
                HandoffStatus::Cancelled,
                StatusExtraFields {
                    cancel_reason: Some("supplier out of stock".to_string()),
                    ..StatusExtraFields::default()
                },
                &agent("A"),
            )
            .unwrap();
        let snap = env.state.ledger_api.compute_earnings("A").unwrap();
        assert!(approx(snap.gross_earned, 0.0));
    }

    // ==========================================
    // 提现申请
    // ==========================================

    #[tokio::test]
    async fn test_payout_against_available_balance() {
        let env = setup_env();
        let a = agent("A");
        let ledger = &env.state.ledger_api;
        shipped_project(&env, "H1", "A");

        // 先提 30,000 并审批通过
        let first = ledger.create_payout_request(&a, 30_000.0, None).await.unwrap();
        assert_eq!(first.status, PayoutStatus::Pending);
        assert_eq!(first.currency, "NGN");
        // pending 不占用可用余额
        assert!(approx(ledger.compute_earnings("A").unwrap().available, 80_000.0));
        ledger.approve_payout(&first.payout_id, Some("ok"), &admin()).unwrap();

        let snap = ledger.compute_earnings("A").unwrap();
        assert!(approx(snap.gross_earned, 100_000.0));
        assert!(approx(snap.locked, 20_000.0));
        assert!(approx(snap.paid_out, 30_000.0));
        assert!(approx(snap.available, 50_000.0));

        let err = ledger
            .create_payout_request(&a, 60_000.0, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        let ok = ledger
            .create_payout_request(&a, 50_000.0, Some("month end".to_string()))
            .await
            .unwrap();
        assert_eq!(ok.status, PayoutStatus::Pending);
        assert!(approx(ok.amount, 50_000.0));

        assert_eq!(ledger.list_payouts("A").unwrap().len(), 2);
        assert!(env.events.names().contains(&"PayoutRequested"));
    }

    #[tokio::test]
    async fn test_payout_amount_validation() {
        let env = setup_env();
        let a = agent("A");
        shipped_project(&env, "H1", "A");
        let ledger = &env.state.ledger_api;

        for amount in [0.0, -100.0, 4_999.0] {
            let err = ledger.create_payout_request(&a, amount, None).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "amount={}", amount);
        }
        assert!(ledger.list_payouts("A").unwrap().is_empty());

        // 最低提现额来自实时配置
        env.state
            .config_manager
            .set_global_config_value("min_payout_ngn", "1000")
            .unwrap();
        ledger.create_payout_request(&a, 4_999.0, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_payout_text_amount() {
        let env = setup_env();
        let a = agent("A");
        shipped_project(&env, "H1", "A");
        let ledger = &env.state.ledger_api;

        let p = ledger
            .create_payout_request_text(&a, " 50,000 ", None)
            .await
            .unwrap();
        assert!(approx(p.amount, 50_000.0));

        for text in ["", "fifty", "-5000"] {
            let err = ledger
                .create_payout_request_text(&a, text, None)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "text={:?}", text);
        }
    }

    // ==========================================
    // 审批流转
    // ==========================================

    #[tokio::test]
    async fn test_approval_rechecks_available() {
        let env = setup_env();
        let a = agent("A");
        shipped_project(&env, "H1", "A");
        let ledger = &env.state.ledger_api;

        // 两笔 pending 各自不超额，合计超额
        let p1 = ledger.create_payout_request(&a, 50_000.0, None).await.unwrap();
        let p2 = ledger.create_payout_request(&a, 50_000.0, None).await.unwrap();

        ledger.approve_payout(&p1.payout_id, None, &admin()).unwrap();
        let err = ledger.approve_payout(&p2.payout_id, None, &admin()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(
            ledger.get_payout(&p2.payout_id).unwrap().status,
            PayoutStatus::Pending
        );

        let rejected = ledger
            .reject_payout(&p2.payout_id, Some("exceeds balance"), &admin())
            .unwrap();
        assert_eq!(rejected.status, PayoutStatus::Rejected);
        assert_eq!(rejected.admin_note.as_deref(), Some("exceeds balance"));

        let snap = ledger.compute_earnings("A").unwrap();
        assert!(approx(snap.paid_out, 50_000.0));
        assert!(approx(snap.available, 30_000.0));
        assert!(snap.available >= 0.0);
    }

    #[tokio::test]
    async fn test_payout_status_edges() {
        let env = setup_env();
        let a = agent("A");
        shipped_project(&env, "H1", "A");
        let ledger = &env.state.ledger_api;

        let p = ledger.create_payout_request(&a, 10_000.0, None).await.unwrap();

        // 非管理员不能审批
        let err = ledger.approve_payout(&p.payout_id, None, &a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);

        // pending 不能直接打款
        let err = ledger.mark_payout_paid(&p.payout_id, None, &admin()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        let approved = ledger.approve_payout(&p.payout_id, None, &admin()).unwrap();
        assert!(approved.approved_at.is_some());
        let paid = ledger.mark_payout_paid(&p.payout_id, Some("bank ref 889"), &admin()).unwrap();
        assert_eq!(paid.status, PayoutStatus::Paid);
        assert!(paid.paid_at.is_some());

        // approved → paid 不重复计入
        assert!(approx(ledger.compute_earnings("A").unwrap().paid_out, 10_000.0));

        let err = ledger.mark_payout_failed(&p.payout_id, None, &admin()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        let err = ledger.get_payout("missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_failed_payout_returns_to_available() {
        let env = setup_env();
        let a = agent("A");
        shipped_project(&env, "H1", "A");
        let ledger = &env.state.ledger_api;

        let p = ledger.create_payout_request(&a, 20_000.0, None).await.unwrap();
        ledger.approve_payout(&p.payout_id, None, &admin()).unwrap();
        assert!(approx(ledger.compute_earnings("A").unwrap().available, 60_000.0));

        ledger
            .mark_payout_failed(&p.payout_id, Some("account closed"), &admin())
            .unwrap();
        assert!(approx(ledger.compute_earnings("A").unwrap().available, 80_000.0));
    }
}
