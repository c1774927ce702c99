//! Cross-module tests for a single runtime with a recording transport.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::sync::Weak;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::Value;
use serde_json::json;

use zonewire::Command;
use zonewire::ObjectRef;
use zonewire::Zone;
use zonewire::api;

use crate::arg::Arg;
use crate::callback::Callback;
use crate::callback::Reply;
use crate::callback::callback;
use crate::config::UnknownHandles;
use crate::object;
use crate::object::DistributedObject;
use crate::object::ObjectHandle;
use crate::object::Schema;
use crate::rpc;
use crate::rpc::MethodResult;
use crate::rpc::app_error;
use crate::router;
use crate::runtime::Runtime;
use crate::transport;
use crate::transport::Transport;

crate::distributed_object! {
    /// Test fixture.
    pub struct User as "User" {
        gamertag as "gamertag": String => set_gamertag,
        score as "score": i64 => set_score,
        best_friend as "bestFriend": Option<ObjectRef> => set_best_friend,
        friends as "friends": Vec<ObjectRef> => set_friends,
    }
    methods {
        "setGamertag" => change_gamertag,
        "getGamertag" => read_gamertag,
        "friends" => friend_list,
    }
}

impl User {
    fn change_gamertag(&self, rt: &Runtime, args: Vec<Arg>) -> MethodResult {
        let name = args
            .first()
            .and_then(Arg::as_str)
            .ok_or_else(|| app_error(1, "gamertag must be a string"))?;
        self.set_gamertag(name.to_string());
        rt.queue_object_for_sync(self);
        Ok(Arg::null())
    }

    fn read_gamertag(&self, _rt: &Runtime, _args: Vec<Arg>) -> MethodResult {
        Ok(Arg::from(self.gamertag()))
    }

    fn friend_list(&self, rt: &Runtime, _args: Vec<Arg>) -> MethodResult {
        let friends = self
            .friends()
            .iter()
            .filter_map(|r| rt.session().resolve(r))
            .map(Arg::Object)
            .collect();
        Ok(Arg::List(friends))
    }
}

/// Records every payload instead of delivering it.
#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<String>>,
}

impl Transport for Recorder {
    fn send(&self, payload: &str) -> transport::Result<()> {
        self.sent.lock().unwrap().push(payload.to_string());
        Ok(())
    }
}

impl Recorder {
    fn take(&self) -> Vec<Command> {
        self.sent
            .lock()
            .unwrap()
            .drain(..)
            .map(|wire| Command::decode(&wire).unwrap())
            .collect()
    }
}

fn runtime(zone: Zone) -> (Arc<Runtime>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let rt = Runtime::builder(zone)
        .transport(recorder.clone())
        .register_type::<User>()
        .build()
        .unwrap();
    (rt, recorder)
}

fn counting() -> (Callback, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    (callback(move |_| { h.fetch_add(1, Ordering::SeqCst); }), hits)
}

fn recording() -> (Callback, Arc<Mutex<Vec<Reply>>>) {
    let replies = Arc::new(Mutex::new(Vec::new()));
    let r = replies.clone();
    (callback(move |reply| r.lock().unwrap().push(reply)), replies)
}

fn same(a: &ObjectHandle, b: &ObjectHandle) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn pushes(commands: &[Command]) -> Vec<&Value> {
    commands
        .iter()
        .filter(|c| c.api_url.as_deref() == Some(api::PUSH_OBJECT))
        .filter_map(|c| c.get(rpc::OBJECT))
        .collect()
}

// --- identity ---

#[test]
fn test_create_returns_canonical_instance() {
    let (rt, _) = runtime(Zone::Public);
    let a = User::create(rt.session(), 42).unwrap();
    let b = User::create(rt.session(), 42).unwrap();
    let c = User::create(rt.session(), "42").unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(rt.session().cache().len(), 2);
}

#[test]
fn test_two_deserializations_yield_one_instance() {
    let (rt, _) = runtime(Zone::Public);
    let wire = json!({"typeName": "User", "recordId": 7, "data": {"gamertag": "a"}});

    let first = rt.session().materialize(&wire).unwrap();
    let second = rt.session().materialize(&json!({"typeName": "User", "recordId": 7})).unwrap();
    let cached = rt.session().cache().get("User", &7.into()).unwrap();

    assert!(same(&first, &second));
    assert!(same(&first, &cached));
}

#[test]
fn test_cache_add_remove_contains() {
    let (rt, _) = runtime(Zone::Public);
    let cache = rt.session().cache();

    let original: ObjectHandle = Arc::new(User::new(1));
    let duplicate: ObjectHandle = Arc::new(User::new(1));

    let canonical = cache.add(original.clone());
    assert!(same(&canonical, &original));
    assert!(same(&cache.add(duplicate.clone()), &original));

    assert!(cache.contains(&original));
    assert!(!cache.contains(&duplicate));

    assert!(cache.remove(&original));
    assert!(!cache.remove(&original));
    assert!(cache.get_ref(&ObjectRef::new("User", 1)).is_none());
}

#[test]
fn test_cache_remove_ignores_stale_duplicate() {
    let (rt, _) = runtime(Zone::Public);
    let cache = rt.session().cache();

    let canonical = cache.add(Arc::new(User::new(1)));
    let stale: ObjectHandle = Arc::new(User::new(1));

    assert!(!cache.remove(&stale));
    assert!(cache.contains(&canonical));
    assert!(same(&cache.get_ref(&ObjectRef::new("User", 1)).unwrap(), &canonical));
}

#[test]
fn test_cache_get_as_and_of_type() {
    let (rt, _) = runtime(Zone::Public);
    User::create(rt.session(), 1).unwrap().set_gamertag("one".into());
    User::create(rt.session(), 2).unwrap();

    let user = rt.session().resolve_as::<User>(&ObjectRef::new("User", 1)).unwrap();
    assert_eq!(user.gamertag(), "one");
    assert_eq!(rt.session().cache().of_type("User").len(), 2);
    assert!(rt.session().cache().of_type("Clan").is_empty());
}

// --- serialize / deserialize ---

#[test]
fn test_serialize_shapes() {
    let (rt, _) = runtime(Zone::Public);
    let user = User::create(rt.session(), 42).unwrap();
    user.set_gamertag("ada".into());
    user.set_best_friend(Some(ObjectRef::new("User", 7)));

    assert_eq!(user.serialize(false), json!({"typeName": "User", "recordId": 42}));
    assert_eq!(
        user.serialize(true),
        json!({
            "typeName": "User",
            "recordId": 42,
            "data": {
                "gamertag": "ada",
                "score": 0,
                "bestFriend": {"typeName": "User", "recordId": 7},
                "friends": []
            }
        })
    );
}

#[test]
fn test_round_trip_into_another_session() {
    let (a, _) = runtime(Zone::Public);
    let (b, _) = runtime(Zone::Privileged);

    let friend = User::create(a.session(), 2).unwrap();
    friend.set_gamertag("bob".into());
    let user = User::create(a.session(), 1).unwrap();
    user.set_gamertag("ada".into());
    user.set_score(9001);
    user.set_best_friend(Some(friend.object_ref()));
    user.set_friends(vec![friend.object_ref()]);

    let twin = b.session().materialize(&user.serialize(true)).unwrap();
    for name in User::PROPERTIES {
        assert_eq!(twin.property(name), user.property(name), "property {}", name);
    }

    // The referenced friend exists in the other session as a bare instance.
    let bob = b.session().resolve_as::<User>(&ObjectRef::new("User", 2)).unwrap();
    assert_eq!(bob.gamertag(), "");
}

#[test]
fn test_nested_data_is_expanded() {
    let (rt, _) = runtime(Zone::Public);
    let wire = json!({
        "typeName": "User",
        "recordId": 1,
        "data": {
            "bestFriend": {"typeName": "User", "recordId": 2, "data": {"gamertag": "bob"}},
            "friends": [{"typeName": "User", "recordId": 3, "data": {"score": 3}}]
        }
    });
    let user = rt.session().materialize(&wire).unwrap();

    assert_eq!(user.property("bestFriend"), Some(json!({"typeName": "User", "recordId": 2})));
    let bob = rt.session().resolve_as::<User>(&ObjectRef::new("User", 2)).unwrap();
    assert_eq!(bob.gamertag(), "bob");
    let carol = rt.session().resolve_as::<User>(&ObjectRef::new("User", 3)).unwrap();
    assert_eq!(carol.score(), 3);
}

#[test]
fn test_cyclic_references() {
    let (rt, _) = runtime(Zone::Public);
    let wire = json!({
        "typeName": "User",
        "recordId": 1,
        "data": {"bestFriend": {"typeName": "User", "recordId": 2, "data": {
            "bestFriend": {"typeName": "User", "recordId": 1}
        }}}
    });
    let one = rt.session().materialize(&wire).unwrap();
    let two = rt.session().resolve_as::<User>(&ObjectRef::new("User", 2)).unwrap();

    assert_eq!(two.best_friend(), Some(one.object_ref()));
    assert_eq!(rt.session().cache().len(), 2);
}

#[test]
fn test_deserialize_notifies_in_payload_order() {
    let (rt, _) = runtime(Zone::Public);
    let user = User::create(rt.session(), 5).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    user.observers()
        .subscribe(move |c| s.lock().unwrap().push((c.property, c.value.clone())));

    let data = json!({"score": 10, "nickname": "ignored", "gamertag": "zed"});
    rt.session().deserialize(user.as_ref(), &data).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("score", json!(10)), ("gamertag", json!("zed"))]
    );
    assert_eq!(user.score(), 10);
}

#[test]
fn test_deserialize_skips_mismatched_values() {
    let (rt, _) = runtime(Zone::Public);
    let user = User::create(rt.session(), 5).unwrap();
    user.set_score(3);

    rt.session()
        .deserialize(user.as_ref(), &json!({"score": "lots", "gamertag": "x"}))
        .unwrap();
    assert_eq!(user.score(), 3);
    assert_eq!(user.gamertag(), "x");
}

#[test]
fn test_unknown_reference_type_changes_nothing() {
    let (rt, _) = runtime(Zone::Public);
    let user = User::create(rt.session(), 5).unwrap();

    let data = json!({"gamertag": "x", "bestFriend": {"typeName": "Ghost", "recordId": 1}});
    let result = rt.session().deserialize(user.as_ref(), &data);

    assert!(matches!(result, Err(object::Error::UnknownType(name)) if name == "Ghost"));
    assert_eq!(user.gamertag(), "");
}

#[test]
fn test_unknown_type_in_later_sibling_leaves_nested_data_untouched() {
    let (rt, _) = runtime(Zone::Public);
    let user = User::create(rt.session(), 5).unwrap();
    let friend = User::create(rt.session(), 2).unwrap();
    friend.set_gamertag("before".into());

    let (cb, hits) = counting();
    friend.observers().subscribe(move |_| cb(Reply::default()));

    let data = json!({
        "bestFriend": {"typeName": "User", "recordId": 2, "data": {"gamertag": "mutated"}},
        "friends": [{"typeName": "Ghost", "recordId": 1}]
    });
    let result = rt.session().deserialize(user.as_ref(), &data);

    assert!(matches!(result, Err(object::Error::UnknownType(name)) if name == "Ghost"));
    assert_eq!(friend.gamertag(), "before");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(user.best_friend(), None);
    assert!(user.friends().is_empty());
}

#[test]
fn test_materialize_with_unknown_nested_type_builds_nothing() {
    let (rt, _) = runtime(Zone::Public);
    let wire = json!({
        "typeName": "User",
        "recordId": 9,
        "data": {
            "gamertag": "nine",
            "bestFriend": {"typeName": "User", "recordId": 10, "data": {"bestFriend": {"typeName": "Ghost", "recordId": 1}}}
        }
    });

    assert!(matches!(
        rt.session().materialize(&wire),
        Err(object::Error::UnknownType(_))
    ));
    assert!(rt.session().cache().is_empty());
}

#[test]
fn test_apply_reports_errors() {
    let user = User::new(1);
    assert!(matches!(
        user.apply("nope", json!(1)),
        Err(object::Error::UnknownProperty { .. })
    ));
    assert!(matches!(
        user.apply("score", json!(1.5)),
        Err(object::Error::TypeMismatch { .. })
    ));
    user.apply("bestFriend", Value::Null).unwrap();
    assert_eq!(user.best_friend(), None);
}

// --- callbacks ---

#[test]
fn test_single_use_handle_fires_once() {
    let (rt, recorder) = runtime(Zone::Public);
    let (cb, hits) = counting();

    rt.call_method_on_remote(&ObjectRef::new("User", 1), "getGamertag", &[], Some(cb))
        .unwrap();
    let sent = recorder.take();
    let handle = sent[0].callback_handle().unwrap();
    assert_eq!(handle.zone, Zone::Public);

    let response = Command::response(handle, None, json!("ada")).encode().unwrap();
    rt.receive(&response);
    rt.receive(&response);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(rt.router().callbacks().pending(), 0);
}

#[test]
fn test_response_carries_error_and_data() {
    let (rt, recorder) = runtime(Zone::Public);
    let (cb, replies) = recording();

    rt.call_method_on_remote(&ObjectRef::new("User", 1), "setGamertag", &[Arg::from(5i64)], Some(cb))
        .unwrap();
    let handle = recorder.take()[0].callback_handle().unwrap();

    let error = app_error(1, "gamertag must be a string");
    rt.receive(&Command::response(handle, Some(error.clone()), Value::Null).encode().unwrap());

    assert_eq!(*replies.lock().unwrap(), vec![Reply::err(error)]);
}

#[test]
fn test_failed_send_releases_callback() {
    let rt = Runtime::builder(Zone::Public).build().unwrap();
    let (cb, hits) = counting();

    let result = rt.call_method_on_remote(&ObjectRef::new("User", 1), "x", &[], Some(cb));

    assert!(matches!(
        result,
        Err(rpc::Error::Router(router::Error::Transport(transport::Error::ConnectionLost(_))))
    ));
    assert_eq!(rt.router().callbacks().pending(), 0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_callback_arguments_are_marshaled_as_handles() {
    let (rt, recorder) = runtime(Zone::Public);
    let (cb, _) = counting();
    let user = User::create(rt.session(), 3).unwrap();

    let args = [
        Arg::from("x"),
        Arg::from(user),
        Arg::Callback(cb),
        Arg::List(vec![Arg::from(1i64), Arg::from(true)])
    ];
    rt.call_method_on_remote(&ObjectRef::new("User", 1), "m", &args, None).unwrap();

    let sent = recorder.take();
    assert_eq!(
        sent[0].get(rpc::ARGS),
        Some(&json!([
            "x",
            {"typeName": "User", "recordId": 3},
            {"callbackId": 1, "zone": 0},
            [1, true]
        ]))
    );
    assert!(sent[0].callback_handle().is_none());
}

#[test]
fn test_foreign_handle_becomes_forwarder() {
    let (rt, recorder) = runtime(Zone::Privileged);
    let foreign = zonewire::CallbackHandle::new(9, Zone::Public);

    let arg = rt.unmarshal(&foreign.to_value()).unwrap();
    arg.as_callback().unwrap()(Reply::ok(json!([1, 2])));

    let sent = recorder.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].callback_handle(), Some(foreign));
    assert!(sent[0].api_url.is_none());
    assert_eq!(sent[0].callback_data(), &json!([1, 2]));
}

#[test]
fn test_unknown_handle_policy() {
    let unknown = zonewire::CallbackHandle::new(77, Zone::Privileged);

    let (strict, recorder) = runtime(Zone::Privileged);
    strict.router().from_handle(unknown)(Reply::ok(1));
    assert!(recorder.take().is_empty());

    let recorder = Arc::new(Recorder::default());
    let permissive = Runtime::builder(Zone::Privileged)
        .transport(recorder.clone())
        .unknown_handles(UnknownHandles::Forward)
        .build()
        .unwrap();
    permissive.router().from_handle(unknown)(Reply::ok(1));
    assert_eq!(recorder.take().len(), 1);
}

// --- batching ---

#[test]
fn test_queue_three_times_pushes_once() {
    let (rt, recorder) = runtime(Zone::Privileged);
    let user = User::create(rt.session(), 42).unwrap();

    rt.begin_batch();
    for _ in 0..3 {
        rt.queue_object_for_sync(user.as_ref());
    }
    assert!(recorder.take().is_empty());
    assert_eq!(rt.end_batch(), 1);

    let sent = recorder.take();
    assert_eq!(pushes(&sent), vec![&user.serialize(true)]);
}

#[test]
fn test_nested_batches_flush_at_outermost_end() {
    let (rt, recorder) = runtime(Zone::Privileged);
    let user = User::create(rt.session(), 1).unwrap();

    rt.begin_batch();
    rt.begin_batch();
    rt.queue_object_for_sync(user.as_ref());
    assert_eq!(rt.end_batch(), 0);
    assert!(recorder.take().is_empty());
    assert_eq!(rt.end_batch(), 1);
    assert_eq!(pushes(&recorder.take()).len(), 1);
}

#[test]
fn test_queue_outside_batch_flushes_immediately() {
    let (rt, recorder) = runtime(Zone::Privileged);
    let user = User::create(rt.session(), 1).unwrap();

    rt.queue_object_for_sync(user.as_ref());
    assert_eq!(pushes(&recorder.take()).len(), 1);
    assert_eq!(rt.batch().depth(), 0);
}

#[test]
fn test_random_queues_coalesce() {
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let (rt, recorder) = runtime(Zone::Privileged);
        let users: Vec<_> = (0..8).map(|id| User::create(rt.session(), id).unwrap()).collect();

        let mut picks: Vec<usize> = (0..rng.gen_range(1..40)).map(|_| rng.gen_range(0..8)).collect();
        picks.shuffle(&mut rng);
        let mut distinct = picks.clone();
        distinct.sort_unstable();
        distinct.dedup();

        rt.with_batch(|| {
            for &i in &picks {
                rt.queue_object_for_sync(users[i].as_ref());
            }
        });

        let sent = recorder.take();
        let pushed = pushes(&sent);
        assert_eq!(pushed.len(), distinct.len());

        // First-queued order is kept.
        let mut first_seen = Vec::new();
        for &i in &picks {
            if !first_seen.contains(&i) {
                first_seen.push(i);
            }
        }
        let expected: Vec<Value> = first_seen.iter().map(|&i| users[i].serialize(true)).collect();
        assert_eq!(pushed.into_iter().cloned().collect::<Vec<_>>(), expected);
    }
}

/// Queues `User#2` for sync from inside the send of `User#1`'s push.
#[derive(Default)]
struct Requeuing {
    rt: OnceLock<Weak<Runtime>>,
    sent: Mutex<Vec<Command>>,
}

impl Transport for Requeuing {
    fn send(&self, payload: &str) -> transport::Result<()> {
        let command = Command::decode(payload).unwrap();
        let pushed = command.get(rpc::OBJECT).and_then(ObjectRef::from_value);
        self.sent.lock().unwrap().push(command);

        if pushed == Some(ObjectRef::new("User", 1)) {
            let rt = self.rt.get().and_then(Weak::upgrade).unwrap();
            let other = rt.session().resolve(&ObjectRef::new("User", 2)).unwrap();
            rt.queue_object_for_sync(other.as_ref());
        }
        Ok(())
    }
}

#[test]
fn test_flush_tolerates_requeue_from_send() {
    let transport = Arc::new(Requeuing::default());
    let rt = Runtime::builder(Zone::Privileged)
        .transport(transport.clone())
        .register_type::<User>()
        .build()
        .unwrap();
    transport.rt.set(Arc::downgrade(&rt)).unwrap();

    let first = User::create(rt.session(), 1).unwrap();
    let second = User::create(rt.session(), 2).unwrap();

    rt.with_batch(|| {
        rt.queue_object_for_sync(first.as_ref());
        rt.queue_object_for_sync(first.as_ref());
    });

    let sent = transport.sent.lock().unwrap();
    assert_eq!(
        pushes(&sent),
        vec![&first.serialize(true), &second.serialize(true)]
    );
    assert_eq!(rt.batch().depth(), 0);
    assert!(!rt.batch().is_open());
}

#[test]
fn test_setter_alone_never_pushes() {
    let (rt, recorder) = runtime(Zone::Privileged);
    let user = User::create(rt.session(), 1).unwrap();
    user.set_gamertag("quiet".into());
    assert!(recorder.take().is_empty());
}

// --- local dispatch ---

#[test]
fn test_local_route_answers_synchronously() {
    let rt = Runtime::builder(Zone::Public)
        .route("Social.ping", |rt: &Runtime, command: Command| {
            rt.router().respond(&command, Reply::ok("pong"));
        })
        .build()
        .unwrap();
    let (cb, replies) = recording();

    rt.send_to_public(Command::new("Social.ping"), Some(cb)).unwrap();

    assert_eq!(*replies.lock().unwrap(), vec![Reply::ok("pong")]);
    assert_eq!(rt.router().callbacks().pending(), 0);
}

#[test]
fn test_unresolvable_path_fires_nothing() {
    let (rt, recorder) = runtime(Zone::Public);
    let (cb, hits) = counting();

    rt.send_command_to_local_zone(
        Command::new("Foo.Bar.doesNotExist").with("reason", "probe"),
        Some(cb),
    );

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(recorder.take().is_empty());
}

#[test]
fn test_local_method_chain_iterates_lists() {
    let (rt, _) = runtime(Zone::Public);
    let names = ["ada", "bob"];
    let friends: Vec<ObjectRef> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let friend = User::create(rt.session(), i as i64 + 10).unwrap();
            friend.set_gamertag(name.to_string());
            friend.object_ref()
        })
        .collect();
    User::create(rt.session(), 1).unwrap().set_friends(friends);

    let (cb, replies) = recording();
    let command = Command::new(api::CALL_METHOD)
        .with(rpc::OBJECT, ObjectRef::new("User", 1).to_value())
        .with(rpc::METHOD, json!(["friends", "getGamertag"]))
        .with(rpc::ARGS, json!([]));
    rt.send_command_to_local_zone(command, Some(cb));

    assert_eq!(*replies.lock().unwrap(), vec![Reply::ok(json!(["ada", "bob"]))]);
}

#[test]
fn test_unknown_method_drops_command() {
    let (rt, recorder) = runtime(Zone::Privileged);
    let (cb, hits) = counting();

    let command = Command::new(api::CALL_METHOD)
        .with(rpc::OBJECT, ObjectRef::new("User", 1).to_value())
        .with(rpc::METHOD, "explode");
    rt.send_command_to_local_zone(command, Some(cb));

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(recorder.take().is_empty());
    assert_eq!(rt.batch().depth(), 0);
}

#[test]
fn test_duplicate_route_fails_build() {
    let result = Runtime::builder(Zone::Public)
        .route("DistributedObjects.extra", |_: &Runtime, _: Command| {})
        .build();
    assert!(result.is_err());
}
