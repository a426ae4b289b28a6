use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rosterd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_raw(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request_raw(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request_raw(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error.code")
        .to_string()
}

struct Session {
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Session {
    fn new(prefix: &str) -> Self {
        let workspace = temp_dir(prefix);
        let (_child, mut stdin, mut reader) = spawn_sidecar();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "ws",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        Session {
            _child,
            stdin,
            reader,
            next_id: 0,
        }
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        self.next_id += 1;
        let id = self.next_id.to_string();
        request_err_code(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn create_class(&mut self, name: &str) -> String {
        let res = self.ok("classes.create", json!({ "className": name }));
        res["class"]["id"].as_str().expect("class id").to_string()
    }

    fn create_student(
        &mut self,
        class_id: &str,
        firstname: &str,
        lastname: &str,
        number: i64,
        gender: &str,
    ) -> String {
        let res = self.ok(
            "students.create",
            json!({
                "classId": class_id,
                "firstname": firstname,
                "lastname": lastname,
                "number": number,
                "gender": gender,
            }),
        );
        res["student"]["id"]
            .as_str()
            .expect("student id")
            .to_string()
    }
}

fn seed_two_students(session: &mut Session) {
    let c1 = session.create_class("9-A");
    let c2 = session.create_class("10-B");
    session.create_student(&c1, "Ali", "Veli", 5, "Male");
    session.create_student(&c2, "Ayşe", "Yılmaz", 15, "Female");
}

fn firstnames(result: &serde_json::Value) -> Vec<String> {
    let mut names: Vec<String> = result["students"]
        .as_array()
        .expect("students array")
        .iter()
        .map(|s| s["firstname"].as_str().expect("firstname").to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn number_then_gender_narrows_to_empty() {
    let mut session = Session::new("rosterd-filter-narrow");
    seed_two_students(&mut session);

    session.ok("filter.toggle", json!({ "facet": "number" }));
    let res = session.ok("filter.setValue", json!({ "facet": "number", "value": "5" }));
    assert_eq!(res["matchCount"].as_u64(), Some(1));
    assert_eq!(firstnames(&res), vec!["Ali"]);
    assert_eq!(res["filtered"].as_bool(), Some(true));

    session.ok("filter.toggle", json!({ "facet": "gender" }));
    let res = session.ok(
        "filter.setValue",
        json!({ "facet": "gender", "value": "Female" }),
    );
    // Still a valid outcome, just an empty one.
    assert_eq!(res["matchCount"].as_u64(), Some(0));
    assert_eq!(res["filtered"].as_bool(), Some(true));
}

#[test]
fn activation_order_does_not_matter_over_ipc() {
    let mut session = Session::new("rosterd-filter-order");
    let c1 = session.create_class("9-A");
    let c2 = session.create_class("10-B");
    session.create_student(&c1, "Ali", "Veli", 5, "Male");
    session.create_student(&c1, "Mehmet", "Kaya", 21, "Male");
    session.create_student(&c2, "Ayşe", "Yılmaz", 15, "Female");

    session.ok("filter.toggle", json!({ "facet": "gender" }));
    session.ok(
        "filter.setValue",
        json!({ "facet": "gender", "value": "Male" }),
    );
    session.ok("filter.toggle", json!({ "facet": "class" }));
    let res_ab = session.ok(
        "filter.setValue",
        json!({ "facet": "class", "value": "9-A" }),
    );

    session.ok("filter.reset", json!({}));

    session.ok("filter.toggle", json!({ "facet": "class" }));
    session.ok(
        "filter.setValue",
        json!({ "facet": "class", "value": "9-A" }),
    );
    session.ok("filter.toggle", json!({ "facet": "gender" }));
    let res_ba = session.ok(
        "filter.setValue",
        json!({ "facet": "gender", "value": "Male" }),
    );

    assert_eq!(firstnames(&res_ab), firstnames(&res_ba));
    assert_eq!(firstnames(&res_ab), vec!["Ali", "Mehmet"]);
}

#[test]
fn non_numeric_number_value_is_rejected_and_previous_result_survives() {
    let mut session = Session::new("rosterd-filter-nonnumeric");
    seed_two_students(&mut session);

    session.ok("filter.toggle", json!({ "facet": "number" }));
    let res = session.ok("filter.setValue", json!({ "facet": "number", "value": "5" }));
    assert_eq!(res["matchCount"].as_u64(), Some(1));

    let code = session.err_code(
        "filter.setValue",
        json!({ "facet": "number", "value": "5a" }),
    );
    assert_eq!(code, "invalid_facet_value");

    // The rejected edit changed nothing: the last valid filter still holds.
    let res = session.ok("filter.evaluate", json!({}));
    assert_eq!(res["matchCount"].as_u64(), Some(1));
    assert_eq!(firstnames(&res), vec!["Ali"]);
    let facets = res["facets"].as_array().expect("facets array");
    let number = facets
        .iter()
        .find(|f| f["key"].as_str() == Some("number"))
        .expect("number facet");
    assert_eq!(number["value"].as_str(), Some("5"));
}

#[test]
fn unknown_class_name_gives_zero_matches() {
    let mut session = Session::new("rosterd-filter-unknown-class");
    seed_two_students(&mut session);

    session.ok("filter.toggle", json!({ "facet": "class" }));
    let res = session.ok(
        "filter.setValue",
        json!({ "facet": "class", "value": "12-Z" }),
    );
    assert_eq!(res["matchCount"].as_u64(), Some(0));
    assert_eq!(res["filtered"].as_bool(), Some(true));
}

#[test]
fn no_active_facets_returns_full_roster_marked_unfiltered() {
    let mut session = Session::new("rosterd-filter-identity");
    seed_two_students(&mut session);

    let res = session.ok("filter.evaluate", json!({}));
    assert_eq!(res["matchCount"].as_u64(), Some(2));
    assert_eq!(res["filtered"].as_bool(), Some(false));

    // Activating a facet without a value is still no constraint.
    session.ok("filter.toggle", json!({ "facet": "name" }));
    let res = session.ok("filter.evaluate", json!({}));
    assert_eq!(res["matchCount"].as_u64(), Some(2));
    assert_eq!(res["filtered"].as_bool(), Some(false));
}

#[test]
fn activating_a_facet_discards_a_value_set_while_inactive() {
    let mut session = Session::new("rosterd-filter-stale-value");
    seed_two_students(&mut session);

    // The value lands on the inactive facet and constrains nothing.
    let res = session.ok(
        "filter.setValue",
        json!({ "facet": "name", "value": "veli" }),
    );
    assert_eq!(res["matchCount"].as_u64(), Some(2));
    assert_eq!(res["filtered"].as_bool(), Some(false));

    // Activation starts unconstrained; the stale value must not resurface.
    let res = session.ok("filter.toggle", json!({ "facet": "name" }));
    assert_eq!(res["matchCount"].as_u64(), Some(2));
    assert_eq!(res["filtered"].as_bool(), Some(false));
    let facets = res["facets"].as_array().expect("facets array");
    let name = facets
        .iter()
        .find(|f| f["key"].as_str() == Some("name"))
        .expect("name facet");
    assert_eq!(name["active"].as_bool(), Some(true));
    assert_eq!(name["value"].as_str(), Some(""));
}

#[test]
fn full_name_query_matches_through_the_fallback() {
    let mut session = Session::new("rosterd-filter-fullname");
    let c1 = session.create_class("9-A");
    session.create_student(&c1, "Jane", "Doe", 1, "Female");
    session.create_student(&c1, "John", "Doe", 2, "Male");

    session.ok("filter.toggle", json!({ "facet": "name" }));
    let res = session.ok(
        "filter.setValue",
        json!({ "facet": "name", "value": "jane doe" }),
    );
    assert_eq!(firstnames(&res), vec!["Jane"]);
}

#[test]
fn toggling_a_facet_off_restores_the_wider_result() {
    let mut session = Session::new("rosterd-filter-toggle-off");
    seed_two_students(&mut session);

    session.ok("filter.toggle", json!({ "facet": "gender" }));
    let res = session.ok(
        "filter.setValue",
        json!({ "facet": "gender", "value": "Female" }),
    );
    assert_eq!(res["matchCount"].as_u64(), Some(1));

    // Deactivation drops the constraint and clears the stored value.
    let res = session.ok("filter.toggle", json!({ "facet": "gender" }));
    assert_eq!(res["matchCount"].as_u64(), Some(2));
    assert_eq!(res["filtered"].as_bool(), Some(false));
    let facets = res["facets"].as_array().expect("facets array");
    let gender = facets
        .iter()
        .find(|f| f["key"].as_str() == Some("gender"))
        .expect("gender facet");
    assert_eq!(gender["active"].as_bool(), Some(false));
    assert_eq!(gender["value"].as_str(), Some(""));
}

#[test]
fn filter_methods_require_a_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "1",
        "filter.evaluate",
        json!({}),
    );
    assert_eq!(code, "no_workspace");
}

#[test]
fn unknown_facet_key_is_bad_params() {
    let mut session = Session::new("rosterd-filter-badfacet");
    let code = session.err_code("filter.toggle", json!({ "facet": "birthdate" }));
    assert_eq!(code, "bad_params");
}
