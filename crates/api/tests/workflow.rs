mod common;

use api::storage::{FilePayload, MAX_UPLOAD_BYTES};
use api::workflow::{
    self, DocumentationInput, NewActivity, WorkflowError,
};
use chrono::{Duration, Utc};
use common::*;
use entity::activity::{FinalStatus, Stage};
use entity::{completion_report, contract, documentation, documentation_photo};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

fn docs_input(name: &str) -> DocumentationInput {
    DocumentationInput {
        name: name.to_string(),
        description: Some("Catatan lapangan".to_string()),
    }
}

#[tokio::test]
async fn activity_walks_the_full_workflow() {
    let env = setup_env().await;
    let worker = insert_user(env.db.as_ref(), "sari@dinas.test", &["EMPLOYEE"]).await;
    let kabid = insert_user(env.db.as_ref(), "kabid@dinas.test", &["SUPERVISOR"]).await;
    let team_id = insert_team(env.db.as_ref(), "Tim A", &[worker]).await;
    let proposal_id = insert_proposal(env.db.as_ref(), "Bibit mangrove", "APPROVED").await;

    let created = workflow::create_activity(
        env.db.as_ref(),
        NewActivity {
            name: "Survei lokasi".into(),
            description: None,
            start_date: Utc::now().date_naive(),
            end_date: None,
            team_id,
            proposal_id: Some(proposal_id),
        },
        &supervisor(kabid),
    )
    .await
    .unwrap();
    assert_eq!(created.stage, Stage::AwaitingConfirmation);

    let confirmed = workflow::confirm_attendance(env.db.as_ref(), created.id, &employee(worker))
        .await
        .unwrap();
    assert_eq!(confirmed.stage, Stage::ObservationDocs);

    let observed = workflow::submit_observation_docs(
        env.db.as_ref(),
        env.store.as_ref(),
        created.id,
        docs_input("Observasi awal"),
        vec![jpg_payload("lokasi.jpg"), jpg_payload("bibit.jpeg")],
        &employee(worker),
    )
    .await
    .unwrap();
    assert_eq!(observed.stage, Stage::AwaitingSupervisorReview);

    let bundles = documentation::Entity::find()
        .filter(documentation::Column::ActivityId.eq(created.id))
        .all(env.db.as_ref())
        .await
        .unwrap();
    assert_eq!(bundles.len(), 1);
    assert_eq!(bundles[0].kind, documentation::Kind::Observation);
    let photos = documentation_photo::Entity::find()
        .filter(documentation_photo::Column::DocumentationId.eq(bundles[0].id))
        .all(env.db.as_ref())
        .await
        .unwrap();
    assert_eq!(photos.len(), 2);
    for photo in &photos {
        assert!(env.upload_dir.path().join(&photo.file_path).is_file());
    }

    let approved = workflow::approve_observation(
        env.db.as_ref(),
        env.store.as_ref(),
        created.id,
        pdf_payload("sktl.pdf"),
    )
    .await
    .unwrap();
    assert_eq!(approved.stage, Stage::HandoverDocs);
    let sktl_path = approved.sktl_path.unwrap();
    assert!(env.upload_dir.path().join(&sktl_path).is_file());

    let handed_over = workflow::submit_handover_docs(
        env.db.as_ref(),
        env.store.as_ref(),
        created.id,
        docs_input("Serah terima"),
        vec![jpg_payload("serah.jpg")],
        Some(pdf_payload("kontrak.pdf")),
        &employee(worker),
    )
    .await
    .unwrap();
    assert_eq!(handed_over.stage, Stage::Completion);
    let stored_contract = contract::Entity::find_by_id(created.id)
        .one(env.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(env
        .upload_dir
        .path()
        .join(&stored_contract.file_path)
        .is_file());

    let done = workflow::submit_completion_report(
        env.db.as_ref(),
        env.store.as_ref(),
        created.id,
        pdf_payload("berita_acara.pdf"),
        FinalStatus::Completed,
        Some("Kegiatan selesai tanpa kendala".into()),
        &employee(worker),
    )
    .await
    .unwrap();
    assert_eq!(done.stage, Stage::Done);
    assert_eq!(done.final_status, Some(FinalStatus::Completed));
    let report = completion_report::Entity::find_by_id(created.id)
        .one(env.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.note.as_deref(), Some("Kegiatan selesai tanpa kendala"));
}

#[tokio::test]
async fn actions_out_of_order_are_rejected() {
    let env = setup_env().await;
    let worker = insert_user(env.db.as_ref(), "sari@dinas.test", &["EMPLOYEE"]).await;
    let team_id = insert_team(env.db.as_ref(), "Tim A", &[worker]).await;
    let activity_id = insert_activity(
        env.db.as_ref(),
        team_id,
        ActivityRow {
            name: "Survei".into(),
            stage: "AWAITING_CONFIRMATION".into(),
            start_date: Utc::now().date_naive(),
            age_days: 0,
        },
    )
    .await;

    // approval requires the supervisor-review stage
    let err = workflow::approve_observation(
        env.db.as_ref(),
        env.store.as_ref(),
        activity_id,
        pdf_payload("sktl.pdf"),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::WrongStage {
            current: Stage::AwaitingConfirmation,
            ..
        }
    ));

    workflow::confirm_attendance(env.db.as_ref(), activity_id, &employee(worker))
        .await
        .unwrap();
    // confirming twice is a stage conflict, not an idempotent no-op
    let err = workflow::confirm_attendance(env.db.as_ref(), activity_id, &employee(worker))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::WrongStage {
            current: Stage::ObservationDocs,
            ..
        }
    ));
}

#[tokio::test]
async fn create_requires_an_approved_proposal() {
    let env = setup_env().await;
    let kabid = insert_user(env.db.as_ref(), "kabid@dinas.test", &["SUPERVISOR"]).await;
    let team_id = insert_team(env.db.as_ref(), "Tim A", &[]).await;
    let pending = insert_proposal(env.db.as_ref(), "Belum disetujui", "SUBMITTED").await;

    let err = workflow::create_activity(
        env.db.as_ref(),
        NewActivity {
            name: "Terlalu dini".into(),
            description: None,
            start_date: Utc::now().date_naive(),
            end_date: None,
            team_id,
            proposal_id: Some(pending),
        },
        &supervisor(kabid),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WorkflowError::ProposalNotApproved));
}

#[tokio::test]
async fn employees_outside_the_team_cannot_act() {
    let env = setup_env().await;
    let member = insert_user(env.db.as_ref(), "sari@dinas.test", &["EMPLOYEE"]).await;
    let outsider = insert_user(env.db.as_ref(), "tamu@dinas.test", &["EMPLOYEE"]).await;
    let kabid = insert_user(env.db.as_ref(), "kabid@dinas.test", &["SUPERVISOR"]).await;
    let team_id = insert_team(env.db.as_ref(), "Tim A", &[member]).await;
    let activity_id = insert_activity(
        env.db.as_ref(),
        team_id,
        ActivityRow {
            name: "Survei".into(),
            stage: "AWAITING_CONFIRMATION".into(),
            start_date: Utc::now().date_naive(),
            age_days: 0,
        },
    )
    .await;

    let err = workflow::confirm_attendance(env.db.as_ref(), activity_id, &employee(outsider))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotTeamMember));

    // supervisors are not bound by team membership
    let model = workflow::confirm_attendance(env.db.as_ref(), activity_id, &supervisor(kabid))
        .await
        .unwrap();
    assert_eq!(model.stage, Stage::ObservationDocs);
}

#[tokio::test]
async fn upload_validation_rejects_bad_files_before_any_write() {
    let env = setup_env().await;
    let team_id = insert_team(env.db.as_ref(), "Tim A", &[]).await;
    let activity_id = insert_activity(
        env.db.as_ref(),
        team_id,
        ActivityRow {
            name: "Review".into(),
            stage: "AWAITING_SUPERVISOR_REVIEW".into(),
            start_date: Utc::now().date_naive(),
            age_days: 0,
        },
    )
    .await;

    let err = workflow::approve_observation(
        env.db.as_ref(),
        env.store.as_ref(),
        activity_id,
        FilePayload {
            file_name: "sktl.exe".into(),
            bytes: b"MZ".to_vec(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    let err = workflow::approve_observation(
        env.db.as_ref(),
        env.store.as_ref(),
        activity_id,
        FilePayload {
            file_name: "sktl.pdf".into(),
            bytes: vec![0u8; MAX_UPLOAD_BYTES + 1],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    // nothing was stored and the stage did not move
    let model = entity::activity::Entity::find_by_id(activity_id)
        .one(env.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model.stage, Stage::AwaitingSupervisorReview);
    assert!(model.sktl_path.is_none());
}

#[tokio::test]
async fn contract_replacement_keeps_a_single_row() {
    let env = setup_env().await;
    let team_id = insert_team(env.db.as_ref(), "Tim A", &[]).await;
    let activity_id = insert_activity(
        env.db.as_ref(),
        team_id,
        ActivityRow {
            name: "Penyerahan".into(),
            stage: "COMPLETION".into(),
            start_date: Utc::now().date_naive(),
            age_days: 0,
        },
    )
    .await;

    let first = workflow::upload_contract(
        env.db.as_ref(),
        env.store.as_ref(),
        activity_id,
        Some("Kontrak v1".into()),
        pdf_payload("kontrak_v1.pdf"),
    )
    .await
    .unwrap();

    let second = workflow::upload_contract(
        env.db.as_ref(),
        env.store.as_ref(),
        activity_id,
        Some("Kontrak v2".into()),
        pdf_payload("kontrak_v2.pdf"),
    )
    .await
    .unwrap();

    assert_ne!(first.file_path, second.file_path);
    assert_eq!(second.name, "Kontrak v2");
    // the old artifact is gone, the new one exists
    assert!(!env.upload_dir.path().join(&first.file_path).exists());
    assert!(env.upload_dir.path().join(&second.file_path).is_file());

    let rows = contract::Entity::find()
        .filter(contract::Column::ActivityId.eq(activity_id))
        .all(env.db.as_ref())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    // uploading a contract never advances the workflow
    let model = entity::activity::Entity::find_by_id(activity_id)
        .one(env.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(model.stage, Stage::Completion);
}

#[tokio::test]
async fn handover_entry_points_both_land_on_completion() {
    let env = setup_env().await;
    let worker = insert_user(env.db.as_ref(), "sari@dinas.test", &["EMPLOYEE"]).await;
    let team_id = insert_team(env.db.as_ref(), "Tim A", &[worker]).await;
    let by_employee = insert_activity(
        env.db.as_ref(),
        team_id,
        ActivityRow {
            name: "Serah terima pegawai".into(),
            stage: "HANDOVER_DOCS".into(),
            start_date: Utc::now().date_naive(),
            age_days: 1,
        },
    )
    .await;
    let by_supervisor = insert_activity(
        env.db.as_ref(),
        team_id,
        ActivityRow {
            name: "Serah terima kabid".into(),
            stage: "HANDOVER_DOCS".into(),
            start_date: (Utc::now() - Duration::days(1)).date_naive(),
            age_days: 1,
        },
    )
    .await;

    let employee_path = workflow::submit_handover_docs(
        env.db.as_ref(),
        env.store.as_ref(),
        by_employee,
        docs_input("Dokumentasi penyerahan"),
        vec![],
        None,
        &employee(worker),
    )
    .await
    .unwrap();
    assert_eq!(employee_path.stage, Stage::Completion);

    let supervisor_path = workflow::process_handover(
        env.db.as_ref(),
        env.store.as_ref(),
        by_supervisor,
        Some(pdf_payload("sktl_penyerahan.pdf")),
        None,
    )
    .await
    .unwrap();
    assert_eq!(supervisor_path.stage, Stage::Completion);
    assert!(supervisor_path.handover_sktl_path.is_some());
}
