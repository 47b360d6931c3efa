// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::process::Command;

#[test]
fn wrong_arguments_exit_with_failure() {
    let output = Command::new(env!("CARGO_BIN_EXE_tars_compare"))
        .arg("only_one_argument")
        .output()
        .unwrap();
    assert_eq!(Some(1), output.status.code());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}

#[test]
fn missing_frames_exit_with_failure() {
    let output = Command::new(env!("CARGO_BIN_EXE_tars_compare"))
        .args(["does/not/exist/im%03d.pgm", "3"])
        .output()
        .unwrap();
    assert_eq!(Some(1), output.status.code());
}
