// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

use std::io;
use std::thread;
use std::time;

use spool::*;

#[test]
fn test_pipeline_connected_to_bound() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut pull = session.create_socket(SocketType::Pull).unwrap();
    let mut push = session.create_socket(SocketType::Push).unwrap();

    pull.bind("tcp://127.0.0.1:5454").unwrap();
    push.connect("tcp://127.0.0.1:5454").unwrap();

    let sent = vec![65, 66, 67];
    push.send(sent).unwrap();
    let received = pull.recv().unwrap();

    assert_eq!(vec![65, 66, 67], received)
}

#[test]
fn test_pipeline_bound_to_connected() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut pull = session.create_socket(SocketType::Pull).unwrap();
    let mut push = session.create_socket(SocketType::Push).unwrap();

    push.bind("tcp://127.0.0.1:5455").unwrap();
    pull.connect("tcp://127.0.0.1:5455").unwrap();

    let sent = vec![65, 66, 67];
    push.send(sent).unwrap();
    let received = pull.recv().unwrap();

    assert_eq!(vec![65, 66, 67], received)
}

#[test]
fn test_send_while_not_connected() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut push = session.create_socket(SocketType::Push).unwrap();
    let mut pull = session.create_socket(SocketType::Pull).unwrap();
    let timeout = time::Duration::from_millis(500);

    let recver = thread::spawn(move || {
        thread::sleep(time::Duration::from_millis(50));
        pull.connect("tcp://127.0.0.1:5456").unwrap();
        let received = pull.recv().unwrap();
        assert_eq!(vec![65, 66, 67], received)
    });

    push.set_send_timeout(timeout).unwrap();
    push.bind("tcp://127.0.0.1:5456").unwrap();
    push.send(vec![65, 66, 67]).unwrap();

    recver.join().unwrap();
}

#[test]
fn test_send_timeout() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut push = session.create_socket(SocketType::Push).unwrap();
    let timeout = time::Duration::from_millis(50);

    push.bind("tcp://127.0.0.1:5457").unwrap();
    push.set_send_timeout(timeout).unwrap();

    let err = push.send(vec![65, 66, 67]).unwrap_err();

    assert_eq!(io::ErrorKind::TimedOut, err.kind());
}

#[test]
fn test_recv_while_not_connected() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut pull = session.create_socket(SocketType::Pull).unwrap();
    let mut push = session.create_socket(SocketType::Push).unwrap();
    let timeout = time::Duration::from_millis(500);

    pull.set_recv_timeout(timeout).unwrap();
    pull.bind("tcp://127.0.0.1:5458").unwrap();

    let sender = thread::spawn(move || {
        thread::sleep(time::Duration::from_millis(50));
        push.connect("tcp://127.0.0.1:5458").unwrap();
        push.send(vec![65, 66, 67]).unwrap();
        thread::sleep(time::Duration::from_millis(100));
    });

    let received = pull.recv().unwrap();
    assert_eq!(vec![65, 66, 67], received);

    sender.join().unwrap();
}

#[test]
fn test_recv_timeout() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut pull = session.create_socket(SocketType::Pull).unwrap();
    let mut push = session.create_socket(SocketType::Push).unwrap();
    let timeout = time::Duration::from_millis(50);

    pull.set_recv_timeout(timeout).unwrap();
    pull.bind("tcp://127.0.0.1:5459").unwrap();
    push.connect("tcp://127.0.0.1:5459").unwrap();

    let err = pull.recv().unwrap_err();

    assert_eq!(io::ErrorKind::TimedOut, err.kind());
}

#[test]
fn test_pair_connected_to_bound() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();

    bound.set_recv_timeout(time::Duration::from_millis(500)).unwrap();
    bound.bind("tcp://127.0.0.1:5460").unwrap();

    connected.set_send_timeout(time::Duration::from_millis(500)).unwrap();
    connected.connect("tcp://127.0.0.1:5460").unwrap();

    let sent = vec![65, 66, 67];
    connected.send(sent).unwrap();
    let received = bound.recv().unwrap();

    assert_eq!(vec![65, 66, 67], received)
}

#[test]
fn test_pair_bound_to_connected() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();

    bound.set_send_timeout(time::Duration::from_millis(500)).unwrap();
    bound.bind("tcp://127.0.0.1:5461").unwrap();

    connected.set_recv_timeout(time::Duration::from_millis(500)).unwrap();
    connected.connect("tcp://127.0.0.1:5461").unwrap();

    let sent = vec![65, 66, 67];
    bound.send(sent).unwrap();
    let received = connected.recv().unwrap();

    assert_eq!(vec![65, 66, 67], received)
}

#[test]
fn test_pair_preserves_message_order() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();

    bound.set_recv_timeout(time::Duration::from_millis(500)).unwrap();
    bound.bind("tcp://127.0.0.1:5474").unwrap();
    connected.connect("tcp://127.0.0.1:5474").unwrap();

    for index in 0..8u8 {
        connected.send(vec![index]).unwrap();
        let received = bound.recv().unwrap();
        assert_eq!(vec![index], received);
    }
}

#[test]
fn test_req_rep() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut server = session.create_socket(SocketType::Rep).unwrap();
    let mut client = session.create_socket(SocketType::Req).unwrap();

    server.set_recv_timeout(time::Duration::from_millis(1000)).unwrap();
    client.set_recv_timeout(time::Duration::from_millis(1000)).unwrap();

    server.bind("tcp://127.0.0.1:5462").unwrap();
    client.connect("tcp://127.0.0.1:5462").unwrap();

    let client_request = vec![65, 66, 67];
    client.send(client_request).unwrap();

    let server_request = server.recv().unwrap();
    assert_eq!(vec![65, 66, 67], server_request);

    let server_reply = vec![67, 66, 65];
    server.send(server_reply).unwrap();

    let client_reply = client.recv().unwrap();

    assert_eq!(vec![67, 66, 65], client_reply);
}

#[test]
fn test_pub_sub() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut server = session.create_socket(SocketType::Pub).unwrap();
    let mut client = session.create_socket(SocketType::Sub).unwrap();
    let timeout = time::Duration::from_millis(100);

    server.bind("tcp://127.0.0.1:5463").unwrap();
    client.connect("tcp://127.0.0.1:5463").unwrap();
    client.set_recv_timeout(timeout).unwrap();
    client.subscribe("A").unwrap();
    client.subscribe("B").unwrap();

    thread::sleep(time::Duration::from_millis(250));

    server.send(vec![65, 66, 67]).unwrap();
    let received_a = client.recv().unwrap();
    assert_eq!(vec![65, 66, 67], received_a);

    server.send(vec![66, 65, 67]).unwrap();
    let received_b = client.recv().unwrap();
    assert_eq!(vec![66, 65, 67], received_b);

    server.send(vec![67, 66, 65]).unwrap();
    let not_received_c = client.recv().unwrap_err();
    assert_eq!(io::ErrorKind::TimedOut, not_received_c.kind());
}

#[test]
fn test_pub_sub_fan_out() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut server = session.create_socket(SocketType::Pub).unwrap();
    let mut client1 = session.create_socket(SocketType::Sub).unwrap();
    let mut client2 = session.create_socket(SocketType::Sub).unwrap();
    let timeout = time::Duration::from_millis(500);

    server.bind("tcp://127.0.0.1:5475").unwrap();
    for client in [&mut client1, &mut client2] {
        client.connect("tcp://127.0.0.1:5475").unwrap();
        client.set_recv_timeout(timeout).unwrap();
        client.subscribe("").unwrap();
    }

    thread::sleep(time::Duration::from_millis(250));

    server.send(vec![88]).unwrap();

    assert_eq!(vec![88], client1.recv().unwrap());
    assert_eq!(vec![88], client2.recv().unwrap());
}

#[test]
fn test_unsubscribe_restores_filtering() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut server = session.create_socket(SocketType::Pub).unwrap();
    let mut client = session.create_socket(SocketType::Sub).unwrap();
    let timeout = time::Duration::from_millis(100);

    server.bind("tcp://127.0.0.1:5476").unwrap();
    client.connect("tcp://127.0.0.1:5476").unwrap();
    client.set_recv_timeout(timeout).unwrap();
    client.subscribe("A").unwrap();

    thread::sleep(time::Duration::from_millis(250));

    server.send(vec![65, 1]).unwrap();
    assert_eq!(vec![65, 1], client.recv().unwrap());

    client.unsubscribe("A").unwrap();

    server.send(vec![65, 2]).unwrap();
    let err = client.recv().unwrap_err();
    assert_eq!(io::ErrorKind::TimedOut, err.kind());
}

#[test]
fn test_bus() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut server = session.create_socket(SocketType::Bus).unwrap();
    let mut client1 = session.create_socket(SocketType::Bus).unwrap();
    let mut client2 = session.create_socket(SocketType::Bus).unwrap();
    let timeout = time::Duration::from_millis(500);

    server.bind("tcp://127.0.0.1:5464").unwrap();
    client1.connect("tcp://127.0.0.1:5464").unwrap();
    client2.connect("tcp://127.0.0.1:5464").unwrap();
    client1.set_recv_timeout(timeout).unwrap();
    client2.set_recv_timeout(timeout).unwrap();

    thread::sleep(time::Duration::from_millis(250));

    let sent = vec![65, 66, 67];
    server.send(sent).expect("Server should have send a msg");
    let received1 = client1.recv().expect("Client #1 should have received the msg");
    assert_eq!(vec![65, 66, 67], received1);
    let received2 = client2.recv().expect("Client #2 should have received the msg");
    assert_eq!(vec![65, 66, 67], received2);
}

#[test]
fn test_bus_triangle() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut alpha = session.create_socket(SocketType::Bus).unwrap();
    let mut beta = session.create_socket(SocketType::Bus).unwrap();
    let mut gamma = session.create_socket(SocketType::Bus).unwrap();
    let timeout = time::Duration::from_millis(500);

    alpha.set_recv_timeout(timeout).unwrap();
    beta.set_recv_timeout(timeout).unwrap();
    gamma.set_recv_timeout(timeout).unwrap();

    alpha.bind("tcp://127.0.0.1:5477").unwrap();
    beta.bind("tcp://127.0.0.1:5478").unwrap();
    beta.connect("tcp://127.0.0.1:5477").unwrap();
    gamma.connect("tcp://127.0.0.1:5477").unwrap();
    gamma.connect("tcp://127.0.0.1:5478").unwrap();

    thread::sleep(time::Duration::from_millis(250));

    alpha.send(vec![1]).unwrap();
    assert_eq!(vec![1], beta.recv().unwrap());
    assert_eq!(vec![1], gamma.recv().unwrap());

    beta.send(vec![2]).unwrap();
    assert_eq!(vec![2], alpha.recv().unwrap());
    assert_eq!(vec![2], gamma.recv().unwrap());

    gamma.send(vec![3]).unwrap();
    assert_eq!(vec![3], alpha.recv().unwrap());
    assert_eq!(vec![3], beta.recv().unwrap());

    // no echo: each sender must not hear its own message
    assert_eq!(io::ErrorKind::TimedOut, alpha.recv().unwrap_err().kind());
    assert_eq!(io::ErrorKind::TimedOut, beta.recv().unwrap_err().kind());
    assert_eq!(io::ErrorKind::TimedOut, gamma.recv().unwrap_err().kind());
}

#[test]
fn test_survey() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut server = session.create_socket(SocketType::Surveyor).unwrap();
    let mut client1 = session.create_socket(SocketType::Respondent).unwrap();
    let mut client2 = session.create_socket(SocketType::Respondent).unwrap();
    let timeout = time::Duration::from_millis(500);

    server.set_recv_timeout(timeout).unwrap();
    server.bind("tcp://127.0.0.1:5465").unwrap();
    client1.connect("tcp://127.0.0.1:5465").unwrap();
    client2.connect("tcp://127.0.0.1:5465").unwrap();
    client1.set_recv_timeout(timeout).unwrap();
    client2.set_recv_timeout(timeout).unwrap();

    thread::sleep(time::Duration::from_millis(250));

    let server_survey = vec![65, 66, 67];
    server.send(server_survey).expect("Server should have send a survey");

    let client1_survey = client1.recv().expect("Client #1 should have received the survey");
    assert_eq!(vec![65, 66, 67], client1_survey);

    let client2_survey = client2.recv().expect("Client #2 should have received the survey");
    assert_eq!(vec![65, 66, 67], client2_survey);

    client1.send(vec![65, 66, 65]).expect("Client #1 should have send a vote");
    let server_resp1 = server.recv().expect("Server should have received the vote from client #1");
    assert_eq!(vec![65, 66, 65], server_resp1);

    client2.send(vec![67, 66, 67]).expect("Client #2 should have send a vote");
    let server_resp2 = server.recv().expect("Server should have received the vote from client #2");
    assert_eq!(vec![67, 66, 67], server_resp2);
}

#[test]
fn test_send_reply_before_send_request() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut server = session.create_socket(SocketType::Rep).unwrap();

    server.bind("tcp://127.0.0.1:5466").unwrap();
    server.send(vec![67, 66, 65]).unwrap_err();
}

#[test]
fn test_recv_reply_before_send_request() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut server = session.create_socket(SocketType::Rep).unwrap();
    let mut client = session.create_socket(SocketType::Req).unwrap();

    server.bind("tcp://127.0.0.1:5467").unwrap();
    client.connect("tcp://127.0.0.1:5467").unwrap();

    let err = client.recv().unwrap_err();
    assert_eq!(io::ErrorKind::Other, err.kind());
}

#[test]
fn test_survey_deadline() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut server = session.create_socket(SocketType::Surveyor).unwrap();
    let mut client = session.create_socket(SocketType::Respondent).unwrap();
    let timeout = time::Duration::from_millis(100);
    let deadline = time::Duration::from_millis(150);

    server.set_survey_deadline(deadline).unwrap();
    server.set_recv_timeout(timeout).unwrap();
    server.bind("tcp://127.0.0.1:5468").unwrap();
    client.connect("tcp://127.0.0.1:5468").unwrap();
    client.set_recv_timeout(time::Duration::from_millis(500)).unwrap();

    thread::sleep(time::Duration::from_millis(250));

    let server_survey = vec![65, 66, 67];
    server.send(server_survey).unwrap();

    let client_survey = client.recv().unwrap();
    assert_eq!(vec![65, 66, 67], client_survey);

    thread::sleep(time::Duration::from_millis(200));

    let err = server.recv().unwrap_err();
    assert_eq!(io::ErrorKind::TimedOut, err.kind());
}

#[test]
fn test_survey_late_response_is_discarded() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut server = session.create_socket(SocketType::Surveyor).unwrap();
    let mut quick = session.create_socket(SocketType::Respondent).unwrap();
    let mut tardy = session.create_socket(SocketType::Respondent).unwrap();

    server.set_survey_deadline(time::Duration::from_millis(150)).unwrap();
    server.set_recv_timeout(time::Duration::from_millis(500)).unwrap();
    server.bind("tcp://127.0.0.1:5479").unwrap();

    quick.connect("tcp://127.0.0.1:5479").unwrap();
    quick.set_recv_timeout(time::Duration::from_millis(500)).unwrap();
    tardy.connect("tcp://127.0.0.1:5479").unwrap();
    tardy.set_recv_timeout(time::Duration::from_millis(500)).unwrap();

    thread::sleep(time::Duration::from_millis(250));

    server.send(vec![63]).unwrap();

    let responders = thread::spawn(move || {
        let survey = quick.recv().unwrap();
        quick.send(survey).unwrap();

        let survey = tardy.recv().unwrap();
        thread::sleep(time::Duration::from_millis(300));
        // the deadline has passed, the response must vanish server-side
        let _ = tardy.send(survey);
    });

    let first = server.recv().unwrap();
    assert_eq!(vec![63], first);

    thread::sleep(time::Duration::from_millis(400));
    let err = server.recv().unwrap_err();
    assert_eq!(io::ErrorKind::TimedOut, err.kind());

    responders.join().unwrap();
}

#[test]
fn test_req_resend() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut server = session.create_socket(SocketType::Rep).unwrap();
    let mut client = session.create_socket(SocketType::Req).unwrap();
    let timeout = time::Duration::from_millis(500);
    let resend_ivl = time::Duration::from_millis(150);

    server.set_recv_timeout(timeout).unwrap();
    server.bind("tcp://127.0.0.1:5469").unwrap();
    client.set_recv_timeout(timeout).unwrap();
    client.set_resend_interval(resend_ivl).unwrap();
    client.connect("tcp://127.0.0.1:5469").unwrap();

    let client_request = vec![65, 66, 67];
    client.send(client_request).unwrap();

    let server_request = server.recv().unwrap();
    assert_eq!(vec![65, 66, 67], server_request);

    // the request is resent while the reply is withheld,
    // so it can be received again
    let server_request2 = server.recv().unwrap();
    assert_eq!(vec![65, 66, 67], server_request2);

    server.send(vec![69, 69, 69]).unwrap();

    let client_reply = client.recv().unwrap();

    assert_eq!(vec![69, 69, 69], client_reply);
}

#[test]
fn test_req_retransmit_to_a_reborn_server() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut client = session.create_socket(SocketType::Req).unwrap();

    client.set_recv_timeout(time::Duration::from_millis(2000)).unwrap();
    client.set_resend_interval(time::Duration::from_millis(100)).unwrap();

    let mut server = session.create_socket(SocketType::Rep).unwrap();
    server.set_recv_timeout(time::Duration::from_millis(1000)).unwrap();
    server.bind("tcp://127.0.0.1:5480").unwrap();

    client.connect("tcp://127.0.0.1:5480").unwrap();
    client.send(vec![65, 66, 67]).unwrap();

    let request = server.recv().unwrap();
    assert_eq!(vec![65, 66, 67], request);

    // the server dies before replying and comes back on the same address
    server.close().unwrap();

    let mut reborn = session.create_socket(SocketType::Rep).unwrap();
    reborn.set_recv_timeout(time::Duration::from_millis(2000)).unwrap();
    reborn.bind("tcp://127.0.0.1:5480").unwrap();

    let request = reborn.recv().unwrap();
    assert_eq!(vec![65, 66, 67], request);

    reborn.send(vec![68]).unwrap();
    assert_eq!(vec![68], client.recv().unwrap());
}

#[test]
fn test_pair_inproc() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();
    let timeout = time::Duration::from_millis(500);

    bound.set_recv_timeout(timeout).unwrap();
    connected.set_recv_timeout(timeout).unwrap();

    bound.bind("inproc://pair-round-trip").unwrap();
    connected.connect("inproc://pair-round-trip").unwrap();

    connected.send(vec![65, 66, 67]).unwrap();
    assert_eq!(vec![65, 66, 67], bound.recv().unwrap());

    bound.send(vec![68, 69, 70, 71]).unwrap();
    assert_eq!(vec![68, 69, 70, 71], connected.recv().unwrap());
}

#[test]
fn test_inproc_connect_before_bind() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let timeout = time::Duration::from_millis(500);

    connected.set_recv_timeout(timeout).unwrap();
    bound.set_recv_timeout(timeout).unwrap();

    // no binder yet: the connector is parked until the name appears
    connected.connect("inproc://early-bird").unwrap();
    bound.bind("inproc://early-bird").unwrap();

    bound.send(vec![1, 2, 3]).unwrap();
    assert_eq!(vec![1, 2, 3], connected.recv().unwrap());
}

#[test]
fn test_pub_sub_inproc_fan_out() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut server = session.create_socket(SocketType::Pub).unwrap();
    let mut client1 = session.create_socket(SocketType::Sub).unwrap();
    let mut client2 = session.create_socket(SocketType::Sub).unwrap();
    let timeout = time::Duration::from_millis(500);

    server.bind("inproc://fan-out").unwrap();
    for client in [&mut client1, &mut client2] {
        client.connect("inproc://fan-out").unwrap();
        client.set_recv_timeout(timeout).unwrap();
        client.subscribe("").unwrap();
    }

    thread::sleep(time::Duration::from_millis(100));

    server.send(vec![88]).unwrap();

    assert_eq!(vec![88], client1.recv().unwrap());
    assert_eq!(vec![88], client2.recv().unwrap());
}

#[test]
fn test_inproc_name_already_in_use() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut first = session.create_socket(SocketType::Pair).unwrap();
    let mut second = session.create_socket(SocketType::Pair).unwrap();

    first.bind("inproc://taken").unwrap();
    let err = second.bind("inproc://taken").unwrap_err();

    assert_eq!(io::ErrorKind::AddrInUse, err.kind());
}

#[test]
fn test_endpoint_shutdown_releases_inproc_name() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut first = session.create_socket(SocketType::Pair).unwrap();
    let mut second = session.create_socket(SocketType::Pair).unwrap();

    let endpoint = first.bind("inproc://recycled").unwrap();
    endpoint.shutdown().unwrap();

    thread::sleep(time::Duration::from_millis(100));

    second.bind("inproc://recycled").unwrap();
}

#[cfg(not(windows))]
#[test]
fn test_ipc() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();
    let timeout = time::Duration::from_millis(500);

    bound.set_recv_timeout(timeout).unwrap();
    connected.set_recv_timeout(timeout).unwrap();

    bound.bind("ipc:///tmp/test_ipc.ipc").unwrap();
    connected.connect("ipc:///tmp/test_ipc.ipc").unwrap();

    connected.send(vec![65, 66, 67]).unwrap();
    let received = bound.recv().unwrap();
    assert_eq!(vec![65, 66, 67], received);

    bound.send(vec![67, 66, 65]).unwrap();
    let received = connected.recv().unwrap();
    assert_eq!(vec![67, 66, 65], received);
}

#[test]
fn test_zero_length_message() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();

    bound.set_recv_timeout(time::Duration::from_millis(500)).unwrap();
    bound.bind("tcp://127.0.0.1:5470").unwrap();
    connected.connect("tcp://127.0.0.1:5470").unwrap();

    connected.send(Vec::new()).unwrap();
    let received = bound.recv().unwrap();

    assert!(received.is_empty());
}

#[test]
fn test_oversize_message_kills_the_connection() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();

    bound.set_recv_max_size(Some(16)).unwrap();
    bound.set_recv_timeout(time::Duration::from_millis(200)).unwrap();
    bound.bind("tcp://127.0.0.1:5471").unwrap();
    connected.connect("tcp://127.0.0.1:5471").unwrap();

    connected.send(vec![0u8; 64]).unwrap();

    let err = bound.recv().unwrap_err();
    assert_eq!(io::ErrorKind::TimedOut, err.kind());
}

#[test]
fn test_try_recv_would_block() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut pull = session.create_socket(SocketType::Pull).unwrap();

    pull.bind("tcp://127.0.0.1:5472").unwrap();

    let err = pull.try_recv().unwrap_err();
    assert_eq!(io::ErrorKind::WouldBlock, err.kind());
}

#[test]
fn test_close_returns_promptly() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut pair = session.create_socket(SocketType::Pair).unwrap();

    pair.bind("tcp://127.0.0.1:5473").unwrap();

    let before = time::Instant::now();
    pair.close().unwrap();
    assert!(before.elapsed() < time::Duration::from_millis(1500));
}

#[test]
fn test_external_poll_on_recv_fd() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut bound = session.create_socket(SocketType::Pair).unwrap();
    let mut connected = session.create_socket(SocketType::Pair).unwrap();

    bound.set_recv_timeout(time::Duration::from_millis(500)).unwrap();
    bound.bind("tcp://127.0.0.1:5481").unwrap();
    connected.connect("tcp://127.0.0.1:5481").unwrap();

    let fd = bound.recv_fd().unwrap();

    // nothing to read yet: the descriptor must not poll readable
    assert_eq!(0, poll_readable(fd, 100));

    connected.send(vec![90]).unwrap();

    // the pending message makes the descriptor readable
    assert_eq!(1, poll_readable(fd, 1000));
    assert_eq!(vec![90], bound.recv().unwrap());
}

fn poll_readable(fd: std::os::unix::io::RawFd, timeout_ms: i32) -> i32 {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0
    };

    unsafe { libc::poll(&mut pollfd as *mut libc::pollfd, 1, timeout_ms) }
}

#[test]
fn test_bus_device() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut server = session.create_raw_socket(SocketType::Bus).unwrap();
    let mut client1 = session.create_socket(SocketType::Bus).unwrap();
    let mut client2 = session.create_socket(SocketType::Bus).unwrap();
    let timeout = time::Duration::from_millis(500);

    server.bind("tcp://127.0.0.1:5482").unwrap();
    client1.connect("tcp://127.0.0.1:5482").unwrap();
    client2.connect("tcp://127.0.0.1:5482").unwrap();
    client1.set_send_timeout(timeout).unwrap();
    client2.set_send_timeout(timeout).unwrap();
    client1.set_recv_timeout(timeout).unwrap();
    client2.set_recv_timeout(timeout).unwrap();

    thread::sleep(time::Duration::from_millis(250));

    let device_thread = thread::spawn(move || loopback_device(server));

    client1.send(vec![65, 66, 67]).unwrap();
    let received = client2.recv().unwrap();
    assert_eq!(vec![65, 66, 67], received);

    // the relay must not echo the message back to its sender
    let err = client1.recv().unwrap_err();
    assert_eq!(io::ErrorKind::TimedOut, err.kind());

    drop(session);
    device_thread.join().unwrap().unwrap_err();
}

#[test]
fn test_req_rep_device() {
    let _ = env_logger::try_init();
    let session = Session::new().unwrap();
    let mut front = session.create_raw_socket(SocketType::Rep).unwrap();
    let mut back = session.create_raw_socket(SocketType::Req).unwrap();
    let mut client = session.create_socket(SocketType::Req).unwrap();
    let mut worker = session.create_socket(SocketType::Rep).unwrap();

    front.bind("tcp://127.0.0.1:5483").unwrap();
    back.bind("tcp://127.0.0.1:5484").unwrap();

    client.set_recv_timeout(time::Duration::from_millis(2000)).unwrap();
    worker.set_recv_timeout(time::Duration::from_millis(2000)).unwrap();

    client.connect("tcp://127.0.0.1:5483").unwrap();
    worker.connect("tcp://127.0.0.1:5484").unwrap();

    thread::sleep(time::Duration::from_millis(250));

    let device_thread = thread::spawn(move || device(front, back));

    client.send(vec![1, 2, 3]).unwrap();

    let request = worker.recv().unwrap();
    assert_eq!(vec![1, 2, 3], request);

    worker.send(vec![4, 5, 6]).unwrap();

    let reply = client.recv().unwrap();
    assert_eq!(vec![4, 5, 6], reply);

    drop(session);
    device_thread.join().unwrap().unwrap_err();
}
