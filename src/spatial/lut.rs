//! Corner and permutation tables shared by the bricking, clipping and
//! slicing code. The corner numbering is fixed across the whole crate and
//! matches the layout expected by the box-plane intersection shader.

// Corner positions of a unit axis aligned cube        //    2----------5
pub const CUBE_CORNERS: [[f32; 3]; 8] = [              //   /|         /|
    [0., 0., 0.],                                      //  / |        / |
    [1., 0., 0.],                                      // 6----------7  |
    [0., 1., 0.],                                      // |  |       |  |
    [0., 0., 1.],                                      // |  0-------|--1
    [1., 0., 1.],                                      // | /        | /
    [1., 1., 0.],                                      // |/         |/
    [0., 1., 1.],                                      // 3----------4
    [1., 1., 1.],
];

/// Back corner of the unit cube indexed by the sign pattern
/// `[x < 0][y < 0][z < 0]` of the reference direction
pub const BACK_CORNERS: [[[usize; 2]; 2]; 2] = [[[0, 3], [2, 6]], [[1, 4], [5, 7]]];

/// Front corner of the unit cube, same indexing as [`BACK_CORNERS`]
pub const FRONT_CORNERS: [[[usize; 2]; 2]; 2] = [[[7, 5], [4, 1]], [[6, 2], [3, 0]]];

/// Diagonally opposite corner for each cube corner
pub const OPPOSITE_CORNERS: [usize; 8] = [7, 6, 4, 5, 2, 3, 1, 0];

/// Sets of faces adjacent to each cube corner. Faces are numbered
/// (-x, +x, -y, +y, -z, +z).
pub const ADJACENT_CUBE_FACES: [[usize; 3]; 8] = [
    [0, 2, 4],
    [1, 2, 4],
    [0, 3, 4],
    [0, 2, 5],
    [1, 2, 5],
    [1, 3, 4],
    [0, 3, 5],
    [1, 3, 5],
];

/// Sign of the outward normal direction of each cube face
pub const CUBE_FACE_NORMAL_SIGNS: [f32; 6] = [-1., 1., -1., 1., -1., 1.];

/// Corner loop around each cube face, 4 indices per face
pub const CUBE_FACE_LOOPS: [[usize; 4]; 6] = [
    [0, 2, 6, 3],
    [1, 5, 7, 4],
    [0, 1, 4, 3],
    [2, 5, 7, 6],
    [0, 1, 5, 2],
    [3, 4, 7, 6],
];

/// Pairs of corner indices forming the 12 edges of a cube
pub const CUBE_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 5],
    [5, 2],
    [2, 0],
    [0, 3],
    [3, 6],
    [6, 2],
    [1, 4],
    [4, 7],
    [7, 5],
    [3, 4],
    [6, 7],
];

/// Field axes listed from fastest to slowest varying for each storage cycle.
/// Cycle 0 keeps x fastest (zyx layout), cycle 1 stores y fastest (xzy) and
/// cycle 2 stores z fastest (yxz), so no two face neighbours with different
/// cycles share a fastest axis.
pub const STORAGE_AXIS_ORDER: [[usize; 3]; 3] = [[0, 1, 2], [1, 2, 0], [2, 0, 1]];

/// [`STORAGE_AXIS_ORDER`] flattened for upload as a shader uniform array
pub const ORIENTATION_PERMUTATIONS: [u32; 9] = [0, 1, 2, 1, 2, 0, 2, 0, 1];

/// Brick corner permutations corresponding to the 8 rotational arrangements
/// of the box-plane intersection hexagon, one row per back corner
pub const CORNER_PERMUTATIONS: [u32; 64] = [
    0, 1, 2, 3, 4, 5, 6, 7, // Back corner 0
    1, 4, 5, 0, 3, 7, 2, 6, // Back corner 1
    2, 5, 6, 0, 1, 7, 3, 4, // Back corner 2
    3, 4, 0, 6, 7, 1, 2, 5, // Back corner 3
    4, 7, 1, 3, 6, 5, 0, 2, // Back corner 4
    5, 1, 7, 2, 0, 4, 6, 3, // Back corner 5
    6, 3, 2, 7, 4, 0, 5, 1, // Back corner 6
    7, 6, 5, 4, 3, 2, 1, 0, // Back corner 7
];

/// Corners giving the starting points of the edges to test plane
/// intersections against, 4 candidate edges per hexagon corner
pub const EDGE_STARTS: [u32; 24] = [
    0, 1, 4, 0, // Hexagon corner 0
    1, 0, 1, 4, // Hexagon corner 1
    0, 2, 5, 0, // Hexagon corner 2
    2, 0, 2, 5, // Hexagon corner 3
    0, 3, 6, 0, // Hexagon corner 4
    3, 0, 3, 6, // Hexagon corner 5
];

/// Corners giving the ending points of the edges to test plane
/// intersections against
pub const EDGE_ENDS: [u32; 24] = [
    1, 4, 7, 0, // Hexagon corner 0
    5, 1, 4, 7, // Hexagon corner 1
    2, 5, 7, 0, // Hexagon corner 2
    6, 2, 5, 7, // Hexagon corner 3
    3, 6, 7, 0, // Hexagon corner 4
    4, 3, 6, 7, // Hexagon corner 5
];
