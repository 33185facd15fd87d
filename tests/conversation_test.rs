mod helpers;

use std::sync::atomic::Ordering;

use helpers::*;
use weirwood::conversation::ConversationError;
use weirwood::llm::{LlmError, TurnRole, FAILURE_REPLY, OVERLOADED_REPLY};
use weirwood::memory::context::LONG_TERM_PREAMBLE;
use weirwood::store::messages::{insert_message, list_messages};
use weirwood::store::types::Role;

#[tokio::test]
async fn turn_stores_message_vector_and_reply() {
    let h = harness(20, 5);
    let user = seed_user(&h.db, "asha@example.com");
    let chat = seed_chat(&h.db, &user, "Cricket");

    let turn = h
        .service
        .respond(&user, &chat.id, "Who won the cricket final?")
        .await
        .unwrap();
    assert_eq!(turn.reply, "reply 1");
    assert!(!turn.fallback);
    assert_eq!(turn.recalled, 0);
    assert_eq!(message_count(&h.db, &chat.id), 1);
    assert_eq!(memory_count(&h.db), 1);

    h.service.remember_reply(&user, &turn).await.unwrap();

    let conn = h.db.lock().unwrap();
    let messages = list_messages(&conn, &chat.id).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].role, Role::Model);
    assert_eq!(messages[1].content, "reply 1");

    // Vectors are keyed by the id of the message they were made from.
    let mut stmt = conn
        .prepare("SELECT id FROM memory_entries ORDER BY created_at, rowid")
        .unwrap();
    let ids: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(ids, vec![messages[0].id.clone(), messages[1].id.clone()]);
}

#[tokio::test]
async fn first_message_does_not_recall_itself() {
    let h = harness(20, 5);
    let user = seed_user(&h.db, "asha@example.com");
    let chat = seed_chat(&h.db, &user, "Food");

    h.service
        .respond(&user, &chat.id, "best biryani in town?")
        .await
        .unwrap();

    let context = h.model.last_context();
    assert_eq!(context.len(), 1);
    assert_eq!(context[0].role, TurnRole::User);
    assert_eq!(context[0].joined_text(), "best biryani in town?");
}

#[tokio::test]
async fn long_term_memory_is_scoped_to_the_user() {
    let h = harness(20, 5);
    let asha = seed_user(&h.db, "asha@example.com");
    let ravi = seed_user(&h.db, "ravi@example.com");
    let asha_old = seed_chat(&h.db, &asha, "Old");
    let ravi_chat = seed_chat(&h.db, &ravi, "Ravi");
    let asha_new = seed_chat(&h.db, &asha, "New");

    h.service
        .respond(&asha, &asha_old.id, "I play guitar every evening")
        .await
        .unwrap();
    h.service
        .respond(&ravi, &ravi_chat.id, "my guitar strings snapped")
        .await
        .unwrap();

    let turn = h
        .service
        .respond(&asha, &asha_new.id, "teach me a guitar chord")
        .await
        .unwrap();
    assert_eq!(turn.recalled, 1);

    let context = h.model.last_context();
    assert_eq!(context.len(), 2);
    let long_term = context[0].joined_text();
    assert!(long_term.starts_with(LONG_TERM_PREAMBLE));
    assert!(long_term.contains("I play guitar every evening"));
    assert!(!long_term.contains("strings snapped"));
    assert_eq!(context[1].joined_text(), "teach me a guitar chord");
}

#[tokio::test]
async fn long_term_recall_ranks_closest_first() {
    let h = harness(20, 5);
    let user = seed_user(&h.db, "asha@example.com");
    let old = seed_chat(&h.db, &user, "Old");
    let new = seed_chat(&h.db, &user, "New");

    for text in ["the monsoon flooded the train tracks", "exam tomorrow", "train was late"] {
        h.service.respond(&user, &old.id, text).await.unwrap();
    }

    h.service
        .respond(&user, &new.id, "which train should I take?")
        .await
        .unwrap();

    let long_term = h.model.last_context()[0].joined_text();
    let recalled: Vec<&str> = long_term
        .trim_start_matches(LONG_TERM_PREAMBLE)
        .trim()
        .lines()
        .collect();
    assert_eq!(recalled.len(), 3);
    assert_eq!(recalled[0], "train was late");
    assert_eq!(recalled[2], "exam tomorrow");
}

#[tokio::test]
async fn short_term_history_is_capped_and_chronological() {
    let h = harness(3, 5);
    let user = seed_user(&h.db, "asha@example.com");
    let chat = seed_chat(&h.db, &user, "Chatter");

    for i in 0..3 {
        let turn = h
            .service
            .respond(&user, &chat.id, &format!("question {i}"))
            .await
            .unwrap();
        h.service.remember_reply(&user, &turn).await.unwrap();
    }
    h.service
        .respond(&user, &chat.id, "question 3")
        .await
        .unwrap();

    let context = h.model.last_context();
    let short_term: Vec<(TurnRole, String)> = context
        .iter()
        .filter(|c| !c.joined_text().starts_with(LONG_TERM_PREAMBLE))
        .map(|c| (c.role, c.joined_text()))
        .collect();
    assert_eq!(
        short_term,
        vec![
            (TurnRole::User, "question 2".to_string()),
            (TurnRole::Model, "reply 3".to_string()),
            (TurnRole::User, "question 3".to_string()),
        ]
    );
}

#[tokio::test]
async fn loading_placeholder_is_never_replayed() {
    let h = harness(20, 5);
    let user = seed_user(&h.db, "asha@example.com");
    let chat = seed_chat(&h.db, &user, "Movies");
    {
        let conn = h.db.lock().unwrap();
        insert_message(&conn, Some(&user.id), &chat.id, "any movie tonight?", Role::User).unwrap();
        insert_message(&conn, Some(&user.id), &chat.id, "...", Role::Model).unwrap();
    }

    h.service
        .respond(&user, &chat.id, "hello again")
        .await
        .unwrap();

    let context = h.model.last_context();
    assert!(context.iter().all(|c| c.joined_text() != "..."));
    assert_eq!(context.len(), 2);
}

#[tokio::test]
async fn fallback_reply_is_saved_but_not_remembered() {
    let h = harness(20, 5);
    let user = seed_user(&h.db, "asha@example.com");
    let chat = seed_chat(&h.db, &user, "Busy");
    h.model.push(Err(LlmError::Overloaded));
    h.model.push(Err(LlmError::EmptyResponse("candidates")));

    let turn = h.service.respond(&user, &chat.id, "hi").await.unwrap();
    assert!(turn.fallback);
    assert_eq!(turn.reply, OVERLOADED_REPLY);
    h.service.remember_reply(&user, &turn).await.unwrap();

    let turn = h.service.respond(&user, &chat.id, "hi?").await.unwrap();
    assert_eq!(turn.reply, FAILURE_REPLY);

    assert_eq!(message_count(&h.db, &chat.id), 3);
    assert_eq!(memory_count(&h.db), 2);
}

#[tokio::test]
async fn foreign_chat_is_not_found() {
    let h = harness(20, 5);
    let asha = seed_user(&h.db, "asha@example.com");
    let ravi = seed_user(&h.db, "ravi@example.com");
    let chat = seed_chat(&h.db, &ravi, "Private");

    let err = h
        .service
        .respond(&asha, &chat.id, "let me in")
        .await
        .unwrap_err();
    assert!(matches!(err, ConversationError::ChatNotFound(id) if id == chat.id));
    assert_eq!(message_count(&h.db, &chat.id), 0);
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn blank_message_is_rejected() {
    let h = harness(20, 5);
    let user = seed_user(&h.db, "asha@example.com");
    let chat = seed_chat(&h.db, &user, "Quiet");

    let err = h.service.respond(&user, &chat.id, "  \n ").await.unwrap_err();
    assert!(matches!(err, ConversationError::EmptyMessage));
    assert_eq!(message_count(&h.db, &chat.id), 0);
}

#[tokio::test]
async fn embedding_failure_aborts_the_turn() {
    let h = harness(20, 5);
    let user = seed_user(&h.db, "asha@example.com");
    let chat = seed_chat(&h.db, &user, "Down");
    h.embedder.fail.store(true, Ordering::SeqCst);

    let err = h.service.respond(&user, &chat.id, "anyone there?").await.unwrap_err();
    assert!(matches!(err, ConversationError::Embedding(LlmError::Overloaded)));
    assert_eq!(h.model.calls(), 0);
    assert_eq!(memory_count(&h.db), 0);
}

#[tokio::test]
async fn remembering_a_reply_touches_the_chat() {
    let h = harness(20, 5);
    let user = seed_user(&h.db, "asha@example.com");
    let chat = seed_chat(&h.db, &user, "Touch");

    let turn = h.service.respond(&user, &chat.id, "ping").await.unwrap();
    h.service.remember_reply(&user, &turn).await.unwrap();

    let conn = h.db.lock().unwrap();
    let updated = weirwood::store::chats::find_chat(&conn, &chat.id)
        .unwrap()
        .unwrap();
    assert!(updated.last_activity > chat.last_activity);
}

#[tokio::test]
async fn reply_is_saved_when_its_embedding_fails() {
    let h = harness(20, 5);
    let user = seed_user(&h.db, "asha@example.com");
    let chat = seed_chat(&h.db, &user, "Flaky");

    let turn = h.service.respond(&user, &chat.id, "tell me a joke").await.unwrap();
    h.embedder.fail.store(true, Ordering::SeqCst);
    h.service.remember_reply(&user, &turn).await.unwrap();

    {
        let conn = h.db.lock().unwrap();
        let messages = list_messages(&conn, &chat.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Model);
        assert_eq!(messages[1].content, turn.reply);
    }
    // Only the user message has a vector.
    assert_eq!(memory_count(&h.db), 1);

    // The saved reply is part of the next turn's history.
    h.embedder.fail.store(false, Ordering::SeqCst);
    h.service.respond(&user, &chat.id, "another one").await.unwrap();
    let history: Vec<String> = h
        .model
        .last_context()
        .iter()
        .map(|c| c.joined_text())
        .collect();
    assert!(history.contains(&turn.reply));
}

#[tokio::test]
async fn recalled_counts_only_distinct_injected_texts() {
    let h = harness(20, 5);
    let user = seed_user(&h.db, "asha@example.com");
    let old = seed_chat(&h.db, &user, "Old");
    let new = seed_chat(&h.db, &user, "New");

    h.service.respond(&user, &old.id, "cricket tonight").await.unwrap();
    h.service.respond(&user, &old.id, "cricket tonight").await.unwrap();

    let turn = h.service.respond(&user, &new.id, "any cricket news?").await.unwrap();
    assert_eq!(turn.recalled, 1);

    let long_term = h.model.last_context()[0].joined_text();
    assert_eq!(long_term.matches("cricket tonight").count(), 1);
}
