use {
    glam::{Vec2, Vec3, Vec4},
    meshstream::{
        Color, DefaultRow, DirectAccess, DynamicAccess, HalfVec2, MeshRow, PackedNormal,
        PackedRgba16N, StaticAccess, Stream, StreamAccessor, StreamKey, StreamKind, StreamReader,
        StreamSet, StreamWriter, Tangents, keys,
    },
};

const EPSILON: f32 = 0.0001;

fn init_logger() {
    let _ = pretty_env_logger::try_init();
}

fn vertex_set() -> StreamSet {
    let mut set = StreamSet::new();
    set.add_stream(keys::POSITION, Vec3::LAYOUT);
    set.add_stream(keys::TANGENTS, Tangents::<PackedNormal>::LAYOUT);
    set.add_stream(keys::COLOR, Color::LAYOUT);

    set.add_stream_to_link_pool(keys::VERTICES_POOL, &keys::POSITION, None);
    set.add_stream_to_link_pool(
        keys::VERTICES_POOL,
        &keys::TANGENTS,
        Some(DefaultRow::new(&Tangents::new(PackedNormal::X, PackedNormal::Z))),
    );
    set.add_stream_to_link_pool(
        keys::VERTICES_POOL,
        &keys::COLOR,
        Some(DefaultRow::new(&Color::WHITE)),
    );

    set
}

fn assert_in_sync(set: &StreamSet) {
    let linkage = set.link_pool(keys::VERTICES_POOL).unwrap();

    for stream in set.iter() {
        assert_eq!(stream.len(), linkage.len(), "{}", stream.key());
        assert_eq!(stream.capacity(), linkage.capacity(), "{}", stream.key());
    }
}

#[test]
fn linked_streams_stay_in_sync() {
    init_logger();

    let mut set = vertex_set();
    let members = [keys::POSITION, keys::TANGENTS, keys::COLOR];

    for (step, key) in members.iter().cycle().take(12).enumerate() {
        {
            let mut stream = set.find_checked_mut(key);

            match step % 4 {
                0 => {
                    stream.add_uninitialized(step * 7 + 1);
                }
                1 => {
                    let num = stream.len() * 3;
                    stream.set_num_zeroed(num);
                }
                2 => {
                    let count = stream.len() / 2;
                    stream.remove_at(1, count, true);
                }
                _ => {
                    let num = stream.capacity() + 100;
                    stream.reserve(num);
                }
            }
        }

        assert_in_sync(&set);
    }

    {
        let mut stream = set.find_checked_mut(&keys::COLOR);
        stream.set_num_uninitialized(0);
        stream.shrink();
    }

    assert_in_sync(&set);
    assert_eq!(set.find_checked(&keys::POSITION).capacity(), 0);
}

#[test]
fn new_rows_get_their_stream_default() {
    init_logger();

    let mut set = vertex_set();
    set.find_checked_mut(&keys::POSITION).push(Vec3::ONE);
    set.find_checked_mut(&keys::COLOR).add_uninitialized(2);

    let tangents = set.find_checked(&keys::TANGENTS);

    assert_eq!(tangents.len(), 3);

    for row in tangents.iter::<Tangents<PackedNormal>>() {
        assert_eq!(row, Tangents::new(PackedNormal::X, PackedNormal::Z));
    }

    assert_eq!(set.find_checked(&keys::COLOR).get::<Color>(0), Color::WHITE);
    assert_eq!(set.find_checked(&keys::POSITION).get::<Vec3>(0), Vec3::ONE);
}

#[test]
fn copies_are_independent() {
    init_logger();

    let mut original = vertex_set();
    original.find_checked_mut(&keys::POSITION).add_zeroed(4);

    let mut copy = StreamSet::new();
    copy.copy_from(&original);

    assert_in_sync(&copy);
    assert_eq!(copy.link_pool_of(&keys::COLOR), Some(keys::VERTICES_POOL));

    copy.find_checked_mut(&keys::COLOR).add_uninitialized(10);
    copy.remove_stream_from_link_pool(&keys::TANGENTS);

    assert_eq!(copy.find_checked(&keys::POSITION).len(), 14);
    assert_in_sync(&original);
    assert_eq!(original.find_checked(&keys::POSITION).len(), 4);
    assert_eq!(original.link_pool_of(&keys::TANGENTS), Some(keys::VERTICES_POOL));

    original.find_checked_mut(&keys::TANGENTS).set_num_zeroed(1);

    assert_eq!(original.find_checked(&keys::COLOR).len(), 1);
    assert_eq!(copy.find_checked(&keys::TANGENTS).len(), 14);
    assert_eq!(copy.find_checked(&keys::COLOR).len(), 14);

    // Stand-alone copies of a stream are never linked
    let stream = original.find_checked(&keys::COLOR).clone();

    assert!(!stream.is_linked());
    assert_eq!(&stream, original.find_checked(&keys::COLOR));
}

#[test]
fn empty_and_shrink_are_idempotent() {
    let mut stream = Stream::with_type::<Vec3>(keys::POSITION);
    stream.add_zeroed(1000);
    stream.remove_at(0, 990, false);

    stream.shrink();
    let shrunk = (stream.len(), stream.capacity());
    stream.shrink();

    assert_eq!(shrunk, (10, 10));
    assert_eq!((stream.len(), stream.capacity()), shrunk);

    stream.empty(16, 0);
    let emptied = (stream.len(), stream.capacity());
    stream.empty(16, 0);

    assert_eq!(emptied, (0, 16));
    assert_eq!((stream.len(), stream.capacity()), emptied);
    assert!(stream.is_empty());
}

#[test]
fn convert_round_trips() {
    init_logger();

    let key = StreamKey::new(StreamKind::Vertex, "Values");

    let values = [0u16, 1, 1000, u16::MAX];
    let mut stream = Stream::from_rows(key.clone(), &values);
    stream.convert_to_type::<i32>();
    assert_eq!(stream.iter::<i32>().collect::<Vec<_>>(), [0, 1, 1000, 65535]);
    stream.convert_to_type::<u16>();
    assert_eq!(stream.iter::<u16>().collect::<Vec<_>>(), values);

    let halves = [0.5f32, -2.0, 1024.0, 0.125];
    let mut stream = Stream::from_rows(key.clone(), &halves);
    stream.convert_to_type::<half::f16>();
    stream.convert_to_type::<f32>();
    assert_eq!(stream.iter::<f32>().collect::<Vec<_>>(), halves);

    let normals = [
        Vec3::X,
        Vec3::new(0.6, 0.8, 0.0),
        Vec3::new(-0.48, 0.6, -0.64),
    ];

    for high_precision in [false, true] {
        let mut stream = Stream::from_rows(key.clone(), &normals);

        if high_precision {
            stream.convert_to_type::<PackedRgba16N>();
        } else {
            stream.convert_to_type::<PackedNormal>();
        }

        stream.convert_to_type::<Vec3>();

        let tolerance = if high_precision { EPSILON } else { 0.01 };
        for (expected, actual) in normals.iter().zip(stream.iter::<Vec3>()) {
            assert!(expected.abs_diff_eq(actual, tolerance), "{expected} {actual}");
        }
    }

    // Element counts must match
    let stream = Stream::from_rows(key, &[[0u32; 3]]);
    assert!(stream.can_convert_to_type::<[u16; 3]>());
    assert!(!stream.can_convert_to_type::<[u16; 2]>());
}

#[test]
fn accessor_flavors_agree() {
    init_logger();

    let rows = (0..8)
        .map(|idx| [idx as u16, idx as u16 * 3, u16::MAX - idx as u16])
        .collect::<Vec<_>>();
    let stream = Stream::from_rows(keys::TRIANGLES, &rows);

    let direct = StreamAccessor::<[u16; 3], DirectAccess>::new(&stream).unwrap();
    let fixed = StreamAccessor::<[u32; 3], StaticAccess<u16>>::new(&stream).unwrap();
    let dynamic = StreamAccessor::<[u32; 3], DynamicAccess>::new(&stream).unwrap();

    for (idx, row) in rows.iter().enumerate() {
        let expected = row.map(u32::from);

        assert_eq!(direct.get_buffer_value(&stream, idx), *row);
        assert_eq!(fixed.get_buffer_value(&stream, idx), expected);
        assert_eq!(dynamic.get_buffer_value(&stream, idx), expected);

        for element in 0..3 {
            assert_eq!(
                fixed.get_element_value(&stream, idx, element),
                dynamic.get_element_value(&stream, idx, element)
            );
        }
    }
}

#[test]
fn strided_access_matches_column() {
    init_logger();

    let rows = (0..5)
        .map(|idx| {
            let idx = idx as f32;
            [Vec2::splat(idx), Vec2::new(idx, -idx), Vec2::new(0.5, idx * 2.0)]
        })
        .collect::<Vec<_>>();
    let stream = Stream::from_rows(keys::TEX_COORDS, &rows);

    for channel in 0..3 {
        let column = rows.iter().map(|row| row[channel]).collect::<Vec<_>>();
        let column = Stream::from_rows(keys::TEX_COORDS, &column);
        let strided = StreamReader::<Vec2>::with_element_offset(&stream, channel).unwrap();
        let direct = StreamReader::<Vec2>::new(&column).unwrap();

        assert_eq!(strided.iter().collect::<Vec<_>>(), direct.iter().collect::<Vec<_>>());
    }

    assert!(StreamReader::<Vec2>::with_element_offset(&stream, 3).is_none());
}

#[test]
fn builder_row_arithmetic() {
    let mut stream = Stream::with_type::<Vec4>(keys::COLOR);
    let mut writer = StreamWriter::<Vec4, DynamicAccess>::new(&mut stream).unwrap();

    writer.append_generator(4, |idx| Vec4::splat(idx as f32));

    {
        let mut row = writer.edit(1);
        row += Vec4::ONE;
    }

    let second = writer.get(2);

    {
        let mut row = writer.edit(3);
        row += second;
    }

    assert_eq!(writer.get(1), Vec4::splat(2.0));
    assert_eq!(writer.get(3), Vec4::splat(5.0));

    let mut stream = Stream::with_type::<HalfVec2>(keys::TEX_COORDS);
    let mut writer = StreamWriter::<Vec2, DynamicAccess>::new(&mut stream).unwrap();
    writer.append([Vec2::new(0.25, 0.5), Vec2::new(4.0, -1.0)]);

    assert_eq!(stream.get::<HalfVec2>(1).to_vec2(), Vec2::new(4.0, -1.0));
}

#[test]
fn encode_decode() {
    init_logger();

    let mut stream = Stream::from_rows(
        keys::POSITION,
        &[Vec3::X, Vec3::Y, Vec3::new(1.0, 2.0, 3.0)],
    );
    stream.reserve(100);

    let mut buf = vec![];
    stream.write_to(&mut buf).unwrap();

    let decoded = Stream::read_from(buf.as_slice()).unwrap();

    assert_eq!(decoded, stream);
    assert_eq!(decoded.capacity(), 3);
    assert_eq!(Stream::decode(&stream.encode().unwrap()).unwrap(), stream);

    buf.truncate(buf.len() - 4);
    assert!(Stream::read_from(buf.as_slice()).is_err());
}
